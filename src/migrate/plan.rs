//! Migration plans: which secret ends up in which 1Password vault, item and field.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{PlanError, TreeError};
use crate::migrate::classify::{is_single_item, should_be_concealed};
use crate::paths::{parse_reference, DirPath};
use crate::tree::{Dir, Tree};

/// Field name used when a secret is promoted to an item of its own.
pub const SINGLE_SECRET_FIELD: &str = "secret";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    #[serde(rename = "field-name")]
    pub name: String,
    #[serde(rename = "value")]
    pub reference: String,
    #[serde(rename = "Concealed")]
    pub concealed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "item-name")]
    pub name: String,
    #[serde(rename = "Fields", default)]
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    #[serde(rename = "vault-name")]
    pub name: String,
    #[serde(rename = "Items", default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(rename = "sign-in-address")]
    pub sign_in_address: String,
    #[serde(rename = "Vaults", default)]
    pub vaults: Vec<Vault>,
}

impl Plan {
    pub fn new(sign_in_address: impl Into<String>) -> Self {
        Self {
            sign_in_address: sign_in_address.into(),
            vaults: Vec::new(),
        }
    }

    pub fn vault(&self, name: &str) -> Option<&Vault> {
        self.vaults.iter().find(|v| v.name == name)
    }

    pub fn item_count(&self) -> usize {
        self.vaults.iter().map(|v| v.items.len()).sum()
    }

    pub fn field_count(&self) -> usize {
        self.vaults
            .iter()
            .flat_map(|v| v.items.iter())
            .map(|i| i.fields.len())
            .sum()
    }

    pub fn to_yaml(&self) -> Result<String, PlanError> {
        serde_yaml::to_string(self).map_err(PlanError::Encode)
    }

    /// Writes the plan, refusing to replace an existing file unless `force` is set.
    pub fn write_to(&self, path: &Path, force: bool) -> Result<(), PlanError> {
        if path.exists() && !force {
            return Err(PlanError::AlreadyExists(path.to_path_buf()));
        }
        let yaml = self.to_yaml()?;
        fs::write(path, yaml).map_err(|source| PlanError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), vaults = self.vaults.len(), items = self.item_count(), "wrote migration plan");
        Ok(())
    }

    /// Reads and validates a plan file.
    pub fn read_from(path: &Path) -> Result<Plan, PlanError> {
        let content = fs::read_to_string(path).map_err(|source| PlanError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let plan: Plan = serde_yaml::from_str(&content).map_err(|source| PlanError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let problems = plan.problems();
        if !problems.is_empty() {
            return Err(PlanError::Invalid {
                path: path.to_path_buf(),
                problems,
            });
        }
        Ok(plan)
    }

    /// Every malformed entry, one line each.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.sign_in_address.trim().is_empty() {
            problems.push("sign-in-address is empty".to_string());
        }
        for vault in &self.vaults {
            if vault.name.trim().is_empty() {
                problems.push("a vault has an empty vault-name".to_string());
            }
            for item in &vault.items {
                if item.name.trim().is_empty() {
                    problems.push(format!("vault '{}': an item has an empty item-name", vault.name));
                }
                for field in &item.fields {
                    if field.name.trim().is_empty() {
                        problems.push(format!(
                            "vault '{}', item '{}': a field has an empty field-name",
                            vault.name, item.name
                        ));
                    }
                    if let Err(err) = parse_reference(&field.reference) {
                        problems.push(format!(
                            "vault '{}', item '{}', field '{}': {err}",
                            vault.name, item.name, field.name
                        ));
                    }
                }
            }
        }
        problems
    }
}

/// Accumulates vaults and items while directory trees are walked.
pub struct PlanBuilder {
    plan: Plan,
    origins: HashMap<String, DirPath>,
}

impl PlanBuilder {
    pub fn new(sign_in_address: impl Into<String>) -> Self {
        Self {
            plan: Plan::new(sign_in_address),
            origins: HashMap::new(),
        }
    }

    /// Registers the vault for `dir_id` and returns its name. The name is the
    /// directory path without its namespace, segments joined by dashes.
    pub fn add_vault(&mut self, tree: &Tree, dir_id: Uuid) -> Result<String, PlanError> {
        let path = tree.abs_dir_path(dir_id)?;
        self.register_vault(path)
    }

    fn register_vault(&mut self, path: DirPath) -> Result<String, PlanError> {
        let name = path.segments()[1..].join("-");

        match self.origins.get(&name) {
            Some(origin) if *origin != path => {
                return Err(PlanError::VaultNameCollision {
                    name,
                    first: origin.to_string(),
                    second: path.to_string(),
                });
            }
            Some(_) => {}
            None => {
                debug!(vault = %name, source = %path, "new vault");
                self.origins.insert(name.clone(), path);
                self.plan.vaults.push(Vault {
                    name: name.clone(),
                    items: Vec::new(),
                });
            }
        }
        Ok(name)
    }

    /// Appends an item. Item names are not required to be unique.
    pub fn add_item(&mut self, vault: &str, name: impl Into<String>, fields: Vec<Field>) {
        let item = Item {
            name: name.into(),
            fields,
        };
        match self.plan.vaults.iter_mut().find(|v| v.name == vault) {
            Some(existing) => existing.items.push(item),
            None => self.plan.vaults.push(Vault {
                name: vault.to_string(),
                items: vec![item],
            }),
        }
    }

    pub fn add_tree(&mut self, tree: &Tree) -> Result<(), PlanError> {
        tree.walk(|dir| self.add_dir(tree, dir))
    }

    fn add_dir(&mut self, tree: &Tree, dir: &Dir) -> Result<(), PlanError> {
        if dir.secrets.is_empty() {
            return Ok(());
        }

        // The root of a snapshot taken below a repository still has a parent in the store.
        let parent = match dir.parent {
            Some(parent) => Some(tree.abs_dir_path(parent)?),
            None => tree.abs_dir_path(dir.id)?.parent(),
        };

        match parent {
            Some(parent) if is_single_item(tree, dir) => {
                let vault = self.register_vault(parent)?;
                let fields = tree
                    .secrets_in(dir)
                    .map(|secret| {
                        Ok(Field {
                            name: secret.name.clone(),
                            reference: tree.abs_secret_path(secret.id)?.reference(),
                            concealed: should_be_concealed(&secret.name),
                        })
                    })
                    .collect::<Result<Vec<_>, TreeError>>()?;
                self.add_item(&vault, dir.name.clone(), fields);
            }
            _ => {
                let vault = self.add_vault(tree, dir.id)?;
                for secret in tree.secrets_in(dir) {
                    let field = Field {
                        name: SINGLE_SECRET_FIELD.to_string(),
                        reference: tree.abs_secret_path(secret.id)?.reference(),
                        concealed: true,
                    };
                    self.add_item(&vault, secret.name.clone(), vec![field]);
                }
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Plan {
        self.plan
    }
}

/// Builds one plan out of all `trees`. Any error discards the partial plan.
pub fn build_plan(sign_in_address: &str, trees: &[Tree]) -> Result<Plan, PlanError> {
    let mut builder = PlanBuilder::new(sign_in_address);
    for tree in trees {
        builder.add_tree(tree)?;
    }
    let plan = builder.finish();
    info!(
        vaults = plan.vaults.len(),
        items = plan.item_count(),
        fields = plan.field_count(),
        "built migration plan"
    );
    Ok(plan)
}
