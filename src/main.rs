use clap::Parser;

use secrethub::cli::{Cli, CliHandler};
use secrethub::config::Config;
use secrethub::{crypto, logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    crypto::init()?;
    logging::init_logging(cli.global.debug)?;

    let config = Config::resolve(cli.global.config_dir, cli.global.credential_passphrase)?;

    let mut handler = CliHandler::new(config);
    handler.run(cli.command).await
}
