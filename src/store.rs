//! File-backed [`SecretsClient`] living in the profile directory.

use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sodiumoxide::crypto::pwhash::argon2id13;
use sodiumoxide::crypto::secretbox;
use tracing::debug;
use zeroize::Zeroizing;

use crate::client::{PathKind, SecretVersion, SecretVersionInfo, SecretsClient};
use crate::crypto::{Sealed, StoreKey};
use crate::error::ClientError;
use crate::models::{DirNode, StoreData};
use crate::paths::{DirPath, SecretPath, Version};
use crate::tree::Tree;

/// Contents of the store file, either sealed under a passphrase or in clear.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "protection", rename_all = "lowercase")]
pub enum Payload {
    Passphrase {
        salt: argon2id13::Salt,
        nonce: secretbox::Nonce,
        ciphertext: Vec<u8>,
    },
    Plain {
        data: StoreData,
    },
}

impl Payload {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Payload::Passphrase { .. })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreFile {
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub namespaces: usize,
    pub repos: usize,
    pub secrets: usize,
}

pub struct LocalStore {
    data_path: PathBuf,
    key: Option<StoreKey>,
    data: Option<StoreData>,
    created_at: Option<DateTime<Utc>>,
}

impl LocalStore {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            key: None,
            data: None,
            created_at: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.data_path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.data_path
    }

    pub fn is_unlocked(&self) -> bool {
        self.data.is_some()
    }

    /// Whether the store on disk is protected by a passphrase.
    pub fn is_encrypted(&self) -> Result<bool, ClientError> {
        Ok(self.load_store_file()?.payload.is_encrypted())
    }

    /// Creates an empty store, replacing any existing file.
    pub fn create(&mut self, passphrase: Option<&str>) -> Result<(), ClientError> {
        if let Some(dir) = self.data_path.parent() {
            fs::create_dir_all(dir)?;
        }

        self.key = passphrase.map(StoreKey::generate).transpose()?;
        self.data = Some(StoreData::new());
        self.created_at = Some(Utc::now());
        self.save()?;
        debug!(path = %self.data_path.display(), encrypted = passphrase.is_some(), "created store");
        Ok(())
    }

    /// Loads the store. Encrypted stores fail with [`ClientError::Locked`]
    /// when no passphrase is given.
    pub fn unlock(&mut self, passphrase: Option<&str>) -> Result<(), ClientError> {
        if !self.exists() {
            return Err(ClientError::NotInitialized);
        }

        let store_file = self.load_store_file()?;
        let (key, data) = match store_file.payload {
            Payload::Passphrase {
                salt,
                nonce,
                ciphertext,
            } => {
                let passphrase = passphrase.ok_or(ClientError::Locked)?;
                let key = StoreKey::derive(passphrase, salt)?;
                let plaintext = key.open(&Sealed { nonce, ciphertext })?;
                let data = serde_json::from_slice(&plaintext)?;
                (Some(key), data)
            }
            Payload::Plain { data } => (None, data),
        };

        self.key = key;
        self.data = Some(data);
        self.created_at = Some(store_file.created_at);
        debug!(path = %self.data_path.display(), "unlocked store");
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats, ClientError> {
        let data = self.data()?;
        Ok(StoreStats {
            namespaces: data.namespaces.len(),
            repos: data.repo_count(),
            secrets: data.secret_count(),
        })
    }

    fn data(&self) -> Result<&StoreData, ClientError> {
        self.data.as_ref().ok_or(ClientError::Locked)
    }

    fn data_mut(&mut self) -> Result<&mut StoreData, ClientError> {
        self.data.as_mut().ok_or(ClientError::Locked)
    }

    pub fn load_store_file(&self) -> Result<StoreFile, ClientError> {
        if !self.exists() {
            return Err(ClientError::NotInitialized);
        }
        let content = fs::read(&self.data_path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    fn save_store_file(&self, store_file: &StoreFile) -> Result<(), ClientError> {
        let content = serde_json::to_vec(store_file)?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.data_path)?;

        #[cfg(unix)]
        {
            let mut perms = file.metadata()?.permissions();
            perms.set_mode(0o600);
            file.set_permissions(perms)?;
        }

        file.write_all(&content)?;
        Ok(())
    }

    /// Writes the unlocked payload, re-sealed under the key it was unlocked with.
    fn save(&self) -> Result<(), ClientError> {
        let data = self.data()?;
        let payload = match &self.key {
            Some(key) => {
                let plaintext = Zeroizing::new(serde_json::to_vec(data)?);
                let Sealed { nonce, ciphertext } = key.seal(&plaintext);
                Payload::Passphrase {
                    salt: key.salt(),
                    nonce,
                    ciphertext,
                }
            }
            None => Payload::Plain { data: data.clone() },
        };

        let now = Utc::now();
        self.save_store_file(&StoreFile {
            payload,
            created_at: self.created_at.unwrap_or(now),
            updated_at: now,
        })
    }
}

fn find_dir<'a>(data: &'a StoreData, path: &DirPath) -> Option<&'a DirNode> {
    let mut node = data.namespaces.get(path.namespace())?.repos.get(path.repo())?;
    for segment in &path.segments()[2..] {
        node = node.dirs.get(segment)?;
    }
    Some(node)
}

fn find_dir_mut<'a>(data: &'a mut StoreData, path: &DirPath) -> Option<&'a mut DirNode> {
    let mut node = data
        .namespaces
        .get_mut(path.namespace())?
        .repos
        .get_mut(path.repo())?;
    for segment in &path.segments()[2..] {
        node = node.dirs.get_mut(segment)?;
    }
    Some(node)
}

fn insert_dir(data: &mut StoreData, path: &DirPath, parents: bool) -> Result<(), ClientError> {
    let Some(parent) = path.parent() else {
        let namespace = data.namespaces.entry(path.namespace().to_string()).or_default();
        if namespace.repos.contains_key(path.repo()) {
            return Err(ClientError::AlreadyExists(path.to_string()));
        }
        namespace.repos.insert(path.repo().to_string(), DirNode::new());
        return Ok(());
    };

    if find_dir(data, &parent).is_none() {
        if !parents {
            return Err(ClientError::NotFound(parent.to_string()));
        }
        insert_dir(data, &parent, true)?;
    }

    let node = find_dir_mut(data, &parent).ok_or_else(|| ClientError::NotFound(parent.to_string()))?;
    let name = path.name();
    if node.dirs.contains_key(name) || node.secrets.contains_key(name) {
        return Err(ClientError::AlreadyExists(path.to_string()));
    }
    node.dirs.insert(name.to_string(), DirNode::new());
    Ok(())
}

fn reject_version(path: &SecretPath) -> Result<(), ClientError> {
    if path.version().is_some() {
        return Err(ClientError::InvalidValue(format!(
            "{path} addresses a single version, use the path without version"
        )));
    }
    Ok(())
}

impl SecretsClient for LocalStore {
    fn read_secret(&self, path: &SecretPath) -> Result<SecretVersion, ClientError> {
        let dir = find_dir(self.data()?, &path.dir()).ok_or_else(|| ClientError::NotFound(path.dir().to_string()))?;
        let entry = dir
            .secrets
            .get(path.name())
            .ok_or_else(|| ClientError::NotFound(path.to_string()))?;

        let version = match path.version() {
            None | Some(Version::Latest) => entry.latest(),
            Some(Version::Number(n)) => entry.find_version(n),
        };
        version
            .map(|v| v.to_version())
            .ok_or_else(|| ClientError::NotFound(path.to_string()))
    }

    fn list_versions(&self, path: &SecretPath) -> Result<Vec<SecretVersionInfo>, ClientError> {
        let dir = find_dir(self.data()?, &path.dir()).ok_or_else(|| ClientError::NotFound(path.dir().to_string()))?;
        let entry = dir
            .secrets
            .get(path.name())
            .ok_or_else(|| ClientError::NotFound(path.to_string()))?;
        Ok(entry.versions.iter().map(|v| v.info()).collect())
    }

    fn write_secret(&mut self, path: &SecretPath, data: &str) -> Result<SecretVersionInfo, ClientError> {
        reject_version(path)?;
        if data.is_empty() {
            return Err(ClientError::InvalidValue("secret value cannot be empty".to_string()));
        }

        let dir_path = path.dir();
        let dir = find_dir_mut(self.data_mut()?, &dir_path)
            .ok_or_else(|| ClientError::NotFound(dir_path.to_string()))?;
        if dir.dirs.contains_key(path.name()) {
            return Err(ClientError::AlreadyExists(format!("directory {path}")));
        }
        let info = dir
            .secrets
            .entry(path.name().to_string())
            .or_default()
            .push_version(data.to_string())
            .info();

        self.save()?;
        debug!(path = %path, version = info.version, "wrote secret");
        Ok(info)
    }

    fn create_dir(&mut self, path: &DirPath, parents: bool) -> Result<(), ClientError> {
        let data = self.data_mut()?;
        if parents && find_dir(data, path).is_some() {
            return Ok(());
        }
        insert_dir(data, path, parents)?;
        self.save()?;
        debug!(path = %path, "created directory");
        Ok(())
    }

    fn remove_secret(&mut self, path: &SecretPath) -> Result<(), ClientError> {
        reject_version(path)?;
        let dir_path = path.dir();
        let dir = find_dir_mut(self.data_mut()?, &dir_path)
            .ok_or_else(|| ClientError::NotFound(dir_path.to_string()))?;
        if dir.secrets.remove(path.name()).is_none() {
            return Err(ClientError::NotFound(path.to_string()));
        }
        self.save()?;
        debug!(path = %path, "removed secret");
        Ok(())
    }

    fn remove_dir(&mut self, path: &DirPath) -> Result<(), ClientError> {
        let data = self.data_mut()?;
        let removed = match path.parent() {
            None => data
                .namespaces
                .get_mut(path.namespace())
                .and_then(|ns| ns.repos.remove(path.repo())),
            Some(parent) => find_dir_mut(data, &parent).and_then(|node| node.dirs.remove(path.name())),
        };
        if removed.is_none() {
            return Err(ClientError::NotFound(path.to_string()));
        }
        self.save()?;
        debug!(path = %path, "removed directory");
        Ok(())
    }

    fn path_kind(&self, path: &DirPath) -> Result<Option<PathKind>, ClientError> {
        let data = self.data()?;
        if find_dir(data, path).is_some() {
            return Ok(Some(PathKind::Dir));
        }
        let is_secret = path
            .as_secret()
            .and_then(|secret| find_dir(data, &secret.dir()).map(|dir| dir.secrets.contains_key(secret.name())))
            .unwrap_or(false);
        Ok(is_secret.then_some(PathKind::Secret))
    }

    fn tree(&self, path: &DirPath) -> Result<Tree, ClientError> {
        let node = find_dir(self.data()?, path).ok_or_else(|| ClientError::NotFound(path.to_string()))?;
        let parent_path = path
            .parent()
            .map_or_else(|| path.namespace().to_string(), |parent| parent.to_string());
        Ok(node.to_tree(&parent_path, path.name())?)
    }

    fn list_repos(&self) -> Result<Vec<DirPath>, ClientError> {
        let mut repos = Vec::new();
        for (namespace, ns) in &self.data()?.namespaces {
            for repo in ns.repos.keys() {
                repos.push(DirPath::parse(&format!("{namespace}/{repo}"))?);
            }
        }
        Ok(repos)
    }
}
