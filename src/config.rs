//! Runtime configuration resolved once from flags and environment.

use std::path::PathBuf;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

use crate::store::LocalStore;

pub const CONFIG_DIR_ENV: &str = "SECRETHUB_CONFIG_DIR";
pub const PASSPHRASE_ENV: &str = "SECRETHUB_CREDENTIAL_PASSPHRASE";
pub const DEBUG_ENV: &str = "SECRETHUB_DEBUG";

const STORE_FILE: &str = "store.dat";

pub struct Config {
    pub config_dir: PathBuf,
    pub passphrase: Option<Zeroizing<String>>,
}

impl Config {
    /// Builds the configuration; without an explicit directory the platform
    /// config directory is used (`~/.config/secrethub` on Linux).
    pub fn resolve(config_dir: Option<PathBuf>, passphrase: Option<String>) -> Result<Self> {
        let config_dir = match config_dir {
            Some(dir) => dir,
            None => dirs::config_dir()
                .context("Failed to find the configuration directory, pass --config-dir")?
                .join("secrethub"),
        };

        Ok(Self {
            config_dir,
            passphrase: passphrase.filter(|p| !p.is_empty()).map(Zeroizing::new),
        })
    }

    pub fn store_path(&self) -> PathBuf {
        self.config_dir.join(STORE_FILE)
    }

    pub fn store(&self) -> LocalStore {
        LocalStore::new(self.store_path())
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_ref().map(|p| p.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_directory_wins() {
        let config = Config::resolve(Some(PathBuf::from("/tmp/sh")), Some(String::new())).unwrap();
        assert_eq!(config.store_path(), PathBuf::from("/tmp/sh/store.dat"));
        assert!(config.passphrase().is_none());
    }
}
