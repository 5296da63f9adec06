//! The seam between commands and the secrets service.

use chrono::{DateTime, Utc};

use crate::error::ClientError;
use crate::paths::{DirPath, SecretPath};
use crate::tree::Tree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Dir,
    Secret,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretVersionInfo {
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretVersion {
    pub info: SecretVersionInfo,
    pub data: String,
}

/// Operations the command layer needs from a secrets service.
///
/// Implementations own storage, encryption and authorization; callers only
/// ever see paths, tree snapshots and plaintext values.
pub trait SecretsClient {
    fn read_secret(&self, path: &SecretPath) -> Result<SecretVersion, ClientError>;

    fn list_versions(&self, path: &SecretPath) -> Result<Vec<SecretVersionInfo>, ClientError>;

    /// Appends a new version, creating the secret when it does not exist yet.
    fn write_secret(&mut self, path: &SecretPath, data: &str) -> Result<SecretVersionInfo, ClientError>;

    fn create_dir(&mut self, path: &DirPath, parents: bool) -> Result<(), ClientError>;

    fn remove_secret(&mut self, path: &SecretPath) -> Result<(), ClientError>;

    /// Removes a directory together with everything below it.
    fn remove_dir(&mut self, path: &DirPath) -> Result<(), ClientError>;

    fn path_kind(&self, path: &DirPath) -> Result<Option<PathKind>, ClientError>;

    fn tree(&self, path: &DirPath) -> Result<Tree, ClientError>;

    fn list_repos(&self) -> Result<Vec<DirPath>, ClientError>;
}
