use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::{SecretVersion, SecretVersionInfo};
use crate::error::TreeError;
use crate::tree::Tree;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretEntryVersion {
    pub version: u32,
    pub data: String,
    pub created_at: DateTime<Utc>,
}

impl SecretEntryVersion {
    pub fn info(&self) -> SecretVersionInfo {
        SecretVersionInfo {
            version: self.version,
            created_at: self.created_at,
        }
    }

    pub fn to_version(&self) -> SecretVersion {
        SecretVersion {
            info: self.info(),
            data: self.data.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretEntry {
    pub id: Uuid,
    pub versions: Vec<SecretEntryVersion>,
}

impl SecretEntry {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            versions: Vec::new(),
        }
    }

    pub fn latest(&self) -> Option<&SecretEntryVersion> {
        self.versions.last()
    }

    pub fn find_version(&self, version: u32) -> Option<&SecretEntryVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    pub fn push_version(&mut self, data: String) -> &SecretEntryVersion {
        let version = self.latest().map_or(1, |v| v.version + 1);
        self.versions.push(SecretEntryVersion {
            version,
            data,
            created_at: Utc::now(),
        });
        &self.versions[self.versions.len() - 1]
    }
}

impl Default for SecretEntry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirNode {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub dirs: BTreeMap<String, DirNode>,
    #[serde(default)]
    pub secrets: BTreeMap<String, SecretEntry>,
}

impl DirNode {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            dirs: BTreeMap::new(),
            secrets: BTreeMap::new(),
        }
    }

    pub fn secret_count(&self) -> usize {
        self.secrets.len() + self.dirs.values().map(DirNode::secret_count).sum::<usize>()
    }

    /// Snapshot of this node and everything below it.
    pub fn to_tree(&self, parent_path: &str, name: &str) -> Result<Tree, TreeError> {
        let mut tree = Tree::new(parent_path, self.id, name);
        self.fill_tree(&mut tree, self.id)?;
        Ok(tree)
    }

    fn fill_tree(&self, tree: &mut Tree, id: Uuid) -> Result<(), TreeError> {
        for (name, secret) in &self.secrets {
            tree.add_secret(id, secret.id, name.as_str())?;
        }
        for (name, child) in &self.dirs {
            tree.add_dir(id, child.id, name.as_str())?;
            child.fill_tree(tree, child.id)?;
        }
        Ok(())
    }
}

impl Default for DirNode {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Namespace {
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub repos: BTreeMap<String, DirNode>,
}

impl Namespace {
    pub fn new() -> Self {
        Self {
            created_at: Utc::now(),
            repos: BTreeMap::new(),
        }
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreData {
    pub namespaces: BTreeMap<String, Namespace>,
    pub version: String,
}

impl StoreData {
    pub fn new() -> Self {
        Self {
            namespaces: BTreeMap::new(),
            version: "1.0.0".to_string(),
        }
    }

    pub fn repo_count(&self) -> usize {
        self.namespaces.values().map(|ns| ns.repos.len()).sum()
    }

    pub fn secret_count(&self) -> usize {
        self.namespaces
            .values()
            .flat_map(|ns| ns.repos.values())
            .map(DirNode::secret_count)
            .sum()
    }
}

impl Default for StoreData {
    fn default() -> Self {
        Self::new()
    }
}
