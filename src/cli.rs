use std::fs;
use std::io::{self, IsTerminal, Read, Write};
use std::num::NonZeroUsize;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use inquire::{Confirm, Password, Text};
use tracing::{debug, info};

use crate::account;
use crate::client::{PathKind, SecretsClient};
use crate::config::{Config, CONFIG_DIR_ENV, DEBUG_ENV, PASSPHRASE_ENV};
use crate::environment::{resolve_environment, EnvVar};
use crate::error::{ApplyError, ClientError};
use crate::generate::{generate, DEFAULT_LENGTH};
use crate::migrate::{self, apply_plan, build_plan, ApplyOptions, Plan, ReferenceMap, Rewrite, Syntax};
use crate::onepassword::{OnePasswordCli, DEFAULT_PROGRAM};
use crate::output;
use crate::paths::{DirPath, SecretPath};
use crate::store::LocalStore;
use crate::template::{render, Variables};

#[derive(Parser)]
#[command(name = "secrethub")]
#[command(about = "Command-line client for the secrets store")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Directory holding the credential store
    #[arg(long, global = true, env = CONFIG_DIR_ENV)]
    pub config_dir: Option<PathBuf>,

    /// Passphrase unlocking the credential store
    #[arg(long, global = true, env = PASSPHRASE_ENV, hide = true, hide_env_values = true)]
    pub credential_passphrase: Option<String>,

    /// Print debug logging to stderr
    #[arg(long, global = true, env = DEBUG_ENV)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the local credential store
    Init {
        /// Store secrets without passphrase protection
        #[arg(long)]
        no_passphrase: bool,
        /// Overwrite an existing store without asking
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Inspect the account and its store
    Account {
        #[command(subcommand)]
        action: AccountCommand,
    },

    /// Print the value of a secret
    Read {
        /// Secret path, optionally with :version
        path: String,
        /// Write the value to a file instead of stdout
        #[arg(long, short = 'o')]
        out_file: Option<PathBuf>,
    },

    /// Write a new version of a secret (from a file, piped stdin or a prompt)
    Write {
        path: String,
        #[arg(long, short = 'i')]
        in_file: Option<PathBuf>,
    },

    /// Generate a random secret and store it
    Generate {
        path: String,
        #[arg(long, short = 'l', default_value_t = DEFAULT_LENGTH)]
        length: NonZeroUsize,
        /// Include symbols in the generated value
        #[arg(long, short = 's')]
        symbols: bool,
    },

    /// Create a repository or directory
    Mkdir {
        path: String,
        /// Create missing parent directories
        #[arg(long, short = 'p')]
        parents: bool,
    },

    /// Remove a secret or directory
    Rm {
        path: String,
        /// Remove directories and their contents
        #[arg(long, short = 'r')]
        recursive: bool,
        /// Do not ask for confirmation
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// List repositories, directory contents or secret versions
    Ls { path: Option<String> },

    /// Show a directory tree
    Tree { path: String },

    /// Fill `{{ path }}` tags in a template with secret values
    Inject {
        /// Template file, stdin when omitted
        #[arg(long, short = 'i')]
        in_file: Option<PathBuf>,
        /// Output file, stdout when omitted
        #[arg(long, short = 'o')]
        out_file: Option<PathBuf>,
        /// Template variable, name=value
        #[arg(long = "var", short = 'v')]
        vars: Vec<String>,
        /// Overwrite the output file without asking
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Run a command with secrets in its environment
    Run {
        #[command(flatten)]
        env: EnvArgs,
        /// Command to run, after `--`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Inspect the environment `run` would set up
    Env {
        #[command(subcommand)]
        action: EnvCommand,
    },

    /// Migrate secrets to 1Password
    Migrate {
        #[command(subcommand)]
        action: MigrateCommand,
    },
}

#[derive(Subcommand)]
pub enum AccountCommand {
    /// Show store location, protection and contents
    Inspect,
}

#[derive(Args, Clone)]
pub struct EnvArgs {
    /// Env file with KEY=value lines, values may hold {{ path }} tags
    #[arg(long)]
    pub env_file: Option<PathBuf>,
    /// Template variable, name=value
    #[arg(long = "var", short = 'v')]
    pub vars: Vec<String>,
}

#[derive(Subcommand)]
pub enum EnvCommand {
    /// List the variables sourced from secrets
    Ls {
        #[command(flatten)]
        env: EnvArgs,
    },
    /// Print the value of one variable
    Read {
        key: String,
        #[command(flatten)]
        env: EnvArgs,
    },
}

#[derive(Subcommand)]
pub enum MigrateCommand {
    /// Write a migration plan for review
    Plan {
        /// 1Password sign-in address, e.g. my.1password.com
        #[arg(long)]
        sign_in_address: Option<String>,
        /// Directory to migrate, repeatable; all repositories when omitted
        #[arg(long = "dir")]
        dirs: Vec<String>,
        #[arg(long, default_value = migrate::DEFAULT_PLAN_FILE)]
        plan_file: PathBuf,
        /// Overwrite an existing plan file
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Write the secrets of a plan into 1Password
    Apply {
        #[arg(long, default_value = migrate::DEFAULT_PLAN_FILE)]
        plan_file: PathBuf,
        /// Overwrite differing values without asking
        #[arg(long)]
        force_update: bool,
        /// Path to the 1Password CLI
        #[arg(long, default_value = DEFAULT_PROGRAM)]
        op_path: PathBuf,
    },
    /// Rewrite config files to 1Password references
    Config {
        #[command(subcommand)]
        action: MigrateConfigCommand,
    },
}

#[derive(Subcommand)]
pub enum MigrateConfigCommand {
    /// Rewrite `{{ path }}` tags in template files
    Templates(RewriteArgs),
    /// Rewrite `secrethub://` references, e.g. in env files
    References(RewriteArgs),
}

#[derive(Args)]
pub struct RewriteArgs {
    #[arg(long, default_value = migrate::DEFAULT_PLAN_FILE)]
    pub plan_file: PathBuf,
    /// Possible values of a variable, name=value1,value2
    #[arg(long = "var", short = 'v')]
    pub vars: Vec<String>,
    /// Replace the files instead of writing `<name>.1password.<ext>` next to them
    #[arg(long)]
    pub in_place: bool,
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

pub struct CliHandler {
    config: Config,
    store: LocalStore,
}

impl CliHandler {
    pub fn new(config: Config) -> Self {
        let store = config.store();
        Self { config, store }
    }

    pub async fn run(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Init { no_passphrase, force } => self.handle_init(no_passphrase, force)?,
            Commands::Account {
                action: AccountCommand::Inspect,
            } => self.handle_inspect()?,
            Commands::Read { path, out_file } => self.handle_read(&path, out_file)?,
            Commands::Write { path, in_file } => self.handle_write(&path, in_file)?,
            Commands::Generate { path, length, symbols } => self.handle_generate(&path, length, symbols)?,
            Commands::Mkdir { path, parents } => self.handle_mkdir(&path, parents)?,
            Commands::Rm { path, recursive, force } => self.handle_rm(&path, recursive, force)?,
            Commands::Ls { path } => self.handle_ls(path.as_deref())?,
            Commands::Tree { path } => self.handle_tree(&path)?,
            Commands::Inject {
                in_file,
                out_file,
                vars,
                force,
            } => self.handle_inject(in_file, out_file, &vars, force)?,
            Commands::Run { env, command } => self.handle_run(&env, &command).await?,
            Commands::Env { action } => match action {
                EnvCommand::Ls { env } => self.handle_env_ls(&env)?,
                EnvCommand::Read { key, env } => self.handle_env_read(&key, &env)?,
            },
            Commands::Migrate { action } => match action {
                MigrateCommand::Plan {
                    sign_in_address,
                    dirs,
                    plan_file,
                    force,
                } => self.handle_migrate_plan(sign_in_address, &dirs, &plan_file, force)?,
                MigrateCommand::Apply {
                    plan_file,
                    force_update,
                    op_path,
                } => self.handle_migrate_apply(&plan_file, force_update, op_path)?,
                MigrateCommand::Config { action } => match action {
                    MigrateConfigCommand::Templates(args) => self.handle_migrate_config(&args, Syntax::Template)?,
                    MigrateConfigCommand::References(args) => self.handle_migrate_config(&args, Syntax::Reference)?,
                },
            },
        }

        Ok(())
    }

    fn handle_init(&mut self, no_passphrase: bool, force: bool) -> Result<()> {
        if self.store.exists() && !force {
            let confirmed = Confirm::new("A store already exists. Do you want to overwrite it?")
                .with_default(false)
                .prompt()?;

            if !confirmed {
                println!("Operation cancelled.");
                return Ok(());
            }
        }

        let passphrase = if no_passphrase {
            None
        } else if let Some(passphrase) = self.config.passphrase() {
            Some(passphrase.to_string())
        } else {
            Some(
                Password::new("Choose a passphrase for the credential store:")
                    .with_display_toggle_enabled()
                    .with_custom_confirmation_message("Confirm the passphrase:")
                    .prompt()?,
            )
        };

        self.store.create(passphrase.as_deref())?;
        println!("Store created at {}", self.store.path().display());

        Ok(())
    }

    fn handle_inspect(&mut self) -> Result<()> {
        if self.store.exists() {
            match self.store.unlock(self.config.passphrase()) {
                Ok(()) | Err(ClientError::Locked) => {}
                Err(err) => return Err(err).context("Failed to open the store"),
            }
        }
        print!("{}", account::inspect(&self.store));
        Ok(())
    }

    fn handle_read(&mut self, path: &str, out_file: Option<PathBuf>) -> Result<()> {
        self.ensure_unlocked()?;
        let path = SecretPath::parse(path)?;
        let secret = self.store.read_secret(&path)?;

        match out_file {
            Some(file) => {
                write_private_file(&file, secret.data.as_bytes())?;
                println!("Wrote version {} of {} to {}", secret.info.version, path, file.display());
            }
            None => println!("{}", secret.data),
        }
        Ok(())
    }

    fn handle_write(&mut self, path: &str, in_file: Option<PathBuf>) -> Result<()> {
        self.ensure_unlocked()?;
        let path = SecretPath::parse(path)?;

        let value = match in_file {
            Some(file) => fs::read_to_string(&file)
                .with_context(|| format!("Failed to read secret value from {}", file.display()))?,
            None if !io::stdin().is_terminal() => {
                let mut value = String::new();
                io::stdin().read_to_string(&mut value)?;
                value.strip_suffix('\n').map(str::to_string).unwrap_or(value)
            }
            None => rpassword::prompt_password("Type in your secret: ")?,
        };

        let info = self.store.write_secret(&path, &value)?;
        println!("Wrote {}:{}", path, info.version);
        Ok(())
    }

    fn handle_generate(&mut self, path: &str, length: NonZeroUsize, symbols: bool) -> Result<()> {
        self.ensure_unlocked()?;
        let path = SecretPath::parse(path)?;
        let value = generate(length, symbols);
        let info = self.store.write_secret(&path, &value)?;
        println!("Generated a random value for {}:{}", path, info.version);
        Ok(())
    }

    fn handle_mkdir(&mut self, path: &str, parents: bool) -> Result<()> {
        self.ensure_unlocked()?;
        let path = DirPath::parse(path)?;
        self.store.create_dir(&path, parents)?;
        let kind = if path.is_repo() { "repository" } else { "directory" };
        println!("Created {kind} {path}");
        Ok(())
    }

    fn handle_rm(&mut self, path: &str, recursive: bool, force: bool) -> Result<()> {
        self.ensure_unlocked()?;
        let path = DirPath::parse(path)?;

        let kind = self
            .store
            .path_kind(&path)?
            .ok_or_else(|| anyhow!("{path} not found"))?;

        if kind == PathKind::Dir && !recursive {
            bail!("{path} is a directory, use --recursive to remove it with all its contents");
        }

        if !force {
            let question = match kind {
                PathKind::Dir => format!("Remove {path} and everything in it?"),
                PathKind::Secret => format!("Remove secret {path} and all its versions?"),
            };
            if !Confirm::new(&question).with_default(false).prompt()? {
                println!("Operation cancelled.");
                return Ok(());
            }
        }

        match kind {
            PathKind::Dir => self.store.remove_dir(&path)?,
            PathKind::Secret => {
                let secret = path.as_secret().ok_or_else(|| anyhow!("{path} is not a secret path"))?;
                self.store.remove_secret(&secret)?;
            }
        }
        println!("Removed {path}");
        Ok(())
    }

    fn handle_ls(&mut self, path: Option<&str>) -> Result<()> {
        self.ensure_unlocked()?;

        let Some(path) = path else {
            let repos = self.store.list_repos()?;
            if repos.is_empty() {
                println!("No repositories yet. Create one with 'secrethub mkdir <namespace>/<repo>'.");
            }
            for repo in repos {
                println!("{repo}");
            }
            return Ok(());
        };

        let path = match SecretPath::parse(path) {
            Ok(secret) if secret.version().is_some() => {
                bail!("{secret} addresses a single version, list {} instead", secret.without_version())
            }
            _ => DirPath::parse(path)?,
        };

        match self.store.path_kind(&path)? {
            Some(PathKind::Dir) => print!("{}", output::render_listing(&self.store.tree(&path)?)),
            Some(PathKind::Secret) => {
                let secret = path.as_secret().ok_or_else(|| anyhow!("{path} is not a secret path"))?;
                print!("{}", output::render_versions(&self.store.list_versions(&secret)?));
            }
            None => bail!("{path} not found"),
        }
        Ok(())
    }

    fn handle_tree(&mut self, path: &str) -> Result<()> {
        self.ensure_unlocked()?;
        let path = DirPath::parse(path)?;
        let tree = self.store.tree(&path)?;
        print!("{}", output::render_tree(&path.to_string(), &tree));
        Ok(())
    }

    fn handle_inject(
        &mut self,
        in_file: Option<PathBuf>,
        out_file: Option<PathBuf>,
        vars: &[String],
        force: bool,
    ) -> Result<()> {
        self.ensure_unlocked()?;
        let vars = Variables::parse(vars)?.with_env(std::env::vars());

        let template = match &in_file {
            Some(file) => fs::read_to_string(file)
                .with_context(|| format!("Failed to read template {}", file.display()))?,
            None => {
                let mut template = String::new();
                io::stdin().read_to_string(&mut template)?;
                template
            }
        };

        let store = &self.store;
        let rendered = render(&template, &vars, |path| -> Result<String> {
            store
                .read_secret(path)
                .map(|secret| secret.data)
                .with_context(|| format!("Failed to read {path}"))
        })?;

        match out_file {
            Some(file) => {
                if file.exists() && !force {
                    let confirmed = Confirm::new(&format!("{} already exists. Overwrite it?", file.display()))
                        .with_default(false)
                        .prompt()?;
                    if !confirmed {
                        println!("Operation cancelled.");
                        return Ok(());
                    }
                }
                write_private_file(&file, rendered.as_bytes())?;
                println!("Injected secrets into {}", file.display());
            }
            None => {
                let mut stdout = io::stdout();
                stdout.write_all(rendered.as_bytes())?;
                stdout.flush()?;
            }
        }
        Ok(())
    }

    fn resolve_env(&mut self, env: &EnvArgs) -> Result<Vec<EnvVar>> {
        self.ensure_unlocked()?;
        let vars = Variables::parse(&env.vars)?.with_env(std::env::vars());
        let env_file = match &env.env_file {
            Some(file) => Some(
                fs::read_to_string(file)
                    .with_context(|| format!("Failed to read env file {}", file.display()))?,
            ),
            None => None,
        };
        Ok(resolve_environment(&self.store, env_file.as_deref(), std::env::vars(), &vars)?)
    }

    async fn handle_run(&mut self, env: &EnvArgs, command: &[String]) -> Result<()> {
        let vars = self.resolve_env(env)?;
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("No command given to run"))?;

        debug!(program = %program, variables = vars.len(), "starting child process");
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .envs(vars.iter().map(|var| (var.name.as_str(), var.value.as_str())))
            .spawn()
            .with_context(|| format!("Failed to start {program}"))?;

        // The child shares the terminal and receives Ctrl-C itself; wait for it to exit.
        let status = tokio::select! {
            status = child.wait() => status?,
            _ = tokio::signal::ctrl_c() => child.wait().await?,
        };

        if !status.success() {
            std::process::exit(status.code().unwrap_or(1));
        }
        Ok(())
    }

    fn handle_env_ls(&mut self, env: &EnvArgs) -> Result<()> {
        let vars = self.resolve_env(env)?;
        for var in vars.iter().filter(|var| var.secret) {
            println!("{}", var.name);
        }
        Ok(())
    }

    fn handle_env_read(&mut self, key: &str, env: &EnvArgs) -> Result<()> {
        let vars = self.resolve_env(env)?;
        let var = vars
            .iter()
            .find(|var| var.name == key)
            .ok_or_else(|| anyhow!("Variable {key} is not set by secrethub"))?;
        println!("{}", var.value);
        Ok(())
    }

    fn handle_migrate_plan(
        &mut self,
        sign_in_address: Option<String>,
        dirs: &[String],
        plan_file: &Path,
        force: bool,
    ) -> Result<()> {
        self.ensure_unlocked()?;

        let mut force = force;
        if plan_file.exists() && !force {
            force = Confirm::new(&format!("{} already exists. Overwrite it?", plan_file.display()))
                .with_default(false)
                .prompt()?;
            if !force {
                println!("Operation cancelled.");
                return Ok(());
            }
        }

        let sign_in_address = match sign_in_address {
            Some(address) => address,
            None => Text::new("1Password sign-in address:")
                .with_default("my.1password.com")
                .prompt()?,
        };

        let dirs = if dirs.is_empty() {
            self.store.list_repos()?
        } else {
            dirs.iter()
                .map(|dir| DirPath::parse(dir))
                .collect::<Result<Vec<_>, _>>()?
        };
        if dirs.is_empty() {
            bail!("Nothing to migrate: the store has no repositories");
        }

        let trees = dirs
            .iter()
            .map(|dir| self.store.tree(dir).with_context(|| format!("Failed to fetch {dir}")))
            .collect::<Result<Vec<_>>>()?;

        let plan = build_plan(&sign_in_address, &trees)?;
        plan.write_to(plan_file, force)?;

        print!("{}", output::render_plan_summary(&plan));
        println!(
            "\nWrote a plan for {} vaults, {} items and {} fields to {}",
            plan.vaults.len(),
            plan.item_count(),
            plan.field_count(),
            plan_file.display()
        );
        println!("Review and edit it, then run 'secrethub migrate apply'.");
        Ok(())
    }

    fn handle_migrate_apply(&mut self, plan_file: &Path, force_update: bool, op_path: PathBuf) -> Result<()> {
        let plan = Plan::read_from(plan_file)?;
        self.ensure_unlocked()?;

        let mut op = OnePasswordCli::new(op_path);
        if !op.is_available() {
            eprintln!("❌ The 1Password CLI (op) is not installed or not in PATH.");
            eprintln!();
            eprintln!("Install it from https://developer.1password.com/docs/cli/get-started/");
            eprintln!("or point to it with --op-path.");
            bail!("1Password CLI not available");
        }

        op.sign_in(&plan.sign_in_address)?;
        info!(vaults = plan.vaults.len(), "applying migration plan");

        let options = ApplyOptions { force_update };
        let summary = apply_plan(&plan, &self.store, &mut op, options, |question| {
            Confirm::new(question)
                .with_default(false)
                .prompt()
                .map_err(|err| ApplyError::Prompt(err.to_string()))
        })?;

        print!("{}", output::render_apply_summary(&summary));
        Ok(())
    }

    fn handle_migrate_config(&mut self, args: &RewriteArgs, syntax: Syntax) -> Result<()> {
        let plan = Plan::read_from(&args.plan_file)?;
        let map = ReferenceMap::from_plan(&plan);
        let vars = Variables::parse(&args.vars)?.with_env(std::env::vars());

        let rewrites = rewrite_files(&args.files, syntax, &map, &vars)?;

        for (file, rewrite) in rewrites {
            let target = if args.in_place {
                file.clone()
            } else {
                rewritten_path(file)
            };
            fs::write(&target, &rewrite.output).with_context(|| format!("Failed to write {}", target.display()))?;
            println!(
                "{}: rewrote {} reference(s) into {}",
                file.display(),
                rewrite.replaced,
                target.display()
            );
        }
        Ok(())
    }

    fn ensure_unlocked(&mut self) -> Result<()> {
        if !self.store.exists() {
            return Err(anyhow!("No store found. Run 'secrethub init' to create one."));
        }

        if !self.store.is_unlocked() {
            match self.store.unlock(self.config.passphrase()) {
                Ok(()) => {}
                Err(ClientError::Locked) => {
                    let passphrase = Password::new("Enter the store passphrase:")
                        .with_display_toggle_enabled()
                        .without_confirmation()
                        .prompt()?;
                    self.store.unlock(Some(&passphrase))?;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }
}

/// Rewrites every file in memory. Failures of all files are reported
/// together and nothing is returned unless every file could be rewritten.
fn rewrite_files<'a>(
    files: &'a [PathBuf],
    syntax: Syntax,
    map: &ReferenceMap,
    vars: &Variables,
) -> Result<Vec<(&'a PathBuf, Rewrite)>> {
    let mut rewrites = Vec::with_capacity(files.len());
    let mut failures = Vec::new();
    for file in files {
        let rewritten = fs::read_to_string(file)
            .map_err(anyhow::Error::from)
            .and_then(|text| Ok(migrate::rewrite(&text, syntax, map, vars)?));
        match rewritten {
            Ok(rewrite) => rewrites.push((file, rewrite)),
            Err(err) => failures.push(format!("{}: {err:#}", file.display())),
        }
    }

    if !failures.is_empty() {
        bail!("Failed to migrate {} file(s):\n{}", failures.len(), failures.join("\n"));
    }
    Ok(rewrites)
}

/// `config.yml` becomes `config.1password.yml`, `.env` becomes `.env.1password`.
fn rewritten_path(file: &Path) -> PathBuf {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let renamed = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}.1password.{ext}"),
        _ => format!("{name}.1password"),
    };
    file.with_file_name(renamed)
}

fn write_private_file(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    #[cfg(unix)]
    {
        let mut perms = file.metadata()?.permissions();
        perms.set_mode(0o600);
        file.set_permissions(perms)?;
    }

    file.write_all(content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewritten_paths_keep_extension() {
        assert_eq!(rewritten_path(Path::new("conf/app.yml")), PathBuf::from("conf/app.1password.yml"));
        assert_eq!(rewritten_path(Path::new(".env")), PathBuf::from(".env.1password"));
        assert_eq!(rewritten_path(Path::new("Makefile")), PathBuf::from("Makefile.1password"));
    }

    #[test]
    fn generate_length_defaults() {
        let cli = Cli::try_parse_from(["secrethub", "generate", "company/app/token"]).unwrap();
        match cli.command {
            Commands::Generate { length, symbols, .. } => {
                assert_eq!(length, DEFAULT_LENGTH);
                assert!(!symbols);
            }
            _ => panic!("expected generate"),
        }
        assert!(Cli::try_parse_from(["secrethub", "generate", "company/app/token", "-l", "0"]).is_err());
    }

    #[test]
    fn rewrite_failures_are_collected_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.env");
        let first = dir.path().join("first.env");
        let second = dir.path().join("second.yml");
        fs::write(&good, "TOKEN=secrethub://company/app/token\n").unwrap();
        fs::write(&first, "DB=secrethub://company/app/db\n").unwrap();
        fs::write(&second, "KEY=secrethub://company/app/key\n").unwrap();

        let mut map = ReferenceMap::new();
        map.insert("company/app/token", "op://app/token/secret");
        let files = vec![good.clone(), first, second];

        let err = rewrite_files(&files, Syntax::Reference, &map, &Variables::new()).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("2 file(s)"));
        assert!(message.contains("secrethub://company/app/db"));
        assert!(message.contains("secrethub://company/app/key"));

        let rewrites = rewrite_files(&files[..1], Syntax::Reference, &map, &Variables::new()).unwrap();
        assert_eq!(rewrites[0].1.output, "TOKEN=op://app/token/secret\n");
    }

    #[test]
    fn parses_nested_commands() {
        let cli = Cli::try_parse_from([
            "secrethub",
            "migrate",
            "config",
            "templates",
            "--var",
            "env=dev,prod",
            "app.yml",
        ])
        .unwrap();
        match cli.command {
            Commands::Migrate {
                action: MigrateCommand::Config {
                    action: MigrateConfigCommand::Templates(args),
                },
            } => {
                assert_eq!(args.vars, vec!["env=dev,prod"]);
                assert_eq!(args.files, vec![PathBuf::from("app.yml")]);
                assert_eq!(args.plan_file, PathBuf::from(migrate::DEFAULT_PLAN_FILE));
            }
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn run_takes_trailing_arguments() {
        let cli = Cli::try_parse_from(["secrethub", "run", "--var", "env=dev", "--", "printenv", "-0"]).unwrap();
        match cli.command {
            Commands::Run { env, command } => {
                assert_eq!(env.vars, vec!["env=dev"]);
                assert_eq!(command, vec!["printenv", "-0"]);
            }
            _ => panic!("unexpected command"),
        }
    }
}
