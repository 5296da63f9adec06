use std::fmt;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::output::format_timestamp;
use crate::store::{LocalStore, StoreStats};

/// What `account inspect` reports about the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountReport {
    pub path: PathBuf,
    pub exists: bool,
    pub size: Option<u64>,
    pub mode: Option<u32>,
    pub encrypted: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Only known when the store could be unlocked.
    pub stats: Option<StoreStats>,
}

pub fn inspect(store: &LocalStore) -> AccountReport {
    let path = store.path().to_path_buf();
    let exists = store.exists();
    let metadata = fs::metadata(&path).ok();

    #[cfg(unix)]
    let mode = metadata.as_ref().map(|m| m.permissions().mode() & 0o777);
    #[cfg(not(unix))]
    let mode = None;

    let file = store.load_store_file().ok();

    AccountReport {
        exists,
        size: metadata.as_ref().map(|m| m.len()),
        mode,
        encrypted: file.as_ref().map(|f| f.payload.is_encrypted()),
        created_at: file.as_ref().map(|f| f.created_at),
        updated_at: file.as_ref().map(|f| f.updated_at),
        stats: store.stats().ok(),
        path,
    }
}

impl fmt::Display for AccountReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Store path: {}", self.path.display())?;
        if !self.exists {
            return writeln!(f, "Store exists: no (run 'secrethub init')");
        }
        writeln!(f, "Store exists: yes")?;
        if let Some(size) = self.size {
            writeln!(f, "File size: {size} bytes")?;
        }
        if let Some(mode) = self.mode {
            writeln!(f, "Permissions: {mode:o}")?;
        }
        match self.encrypted {
            Some(true) => writeln!(f, "Encrypted: yes")?,
            Some(false) => writeln!(f, "Encrypted: no")?,
            None => writeln!(f, "Encrypted: unknown (unreadable store file)")?,
        }
        if let Some(created_at) = self.created_at {
            writeln!(f, "Created: {}", format_timestamp(created_at))?;
        }
        if let Some(updated_at) = self.updated_at {
            writeln!(f, "Updated: {}", format_timestamp(updated_at))?;
        }
        match &self.stats {
            Some(stats) => writeln!(
                f,
                "Contents: {} namespaces, {} repos, {} secrets",
                stats.namespaces, stats.repos, stats.secrets
            ),
            None => writeln!(f, "Contents: locked"),
        }
    }
}
