//! Writes a migration plan into a password manager.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::client::SecretsClient;
use crate::error::{ApplyError, PasswordManagerError};
use crate::migrate::plan::{Item, Plan};
use crate::paths::parse_reference;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValue {
    pub name: String,
    pub value: String,
    pub concealed: bool,
}

/// Destination of a migration.
pub trait PasswordManager {
    fn vault_exists(&mut self, vault: &str) -> Result<bool, PasswordManagerError>;

    fn create_vault(&mut self, vault: &str) -> Result<(), PasswordManagerError>;

    /// Current values of an item's fields by label, `None` when there is no such item.
    fn item_fields(
        &mut self,
        vault: &str,
        item: &str,
    ) -> Result<Option<HashMap<String, String>>, PasswordManagerError>;

    fn create_item(&mut self, vault: &str, item: &str, fields: &[FieldValue]) -> Result<(), PasswordManagerError>;

    fn set_field(&mut self, vault: &str, item: &str, field: &FieldValue) -> Result<(), PasswordManagerError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Overwrite differing values without asking.
    pub force_update: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub updated: usize,
    pub skipped: usize,
    pub up_to_date: usize,
    pub warnings: usize,
}

/// Applies `plan` one vault, item and field at a time. A failure leaves
/// everything processed so far in place.
pub fn apply_plan<C, M, P>(
    plan: &Plan,
    client: &C,
    manager: &mut M,
    options: ApplyOptions,
    mut confirm: P,
) -> Result<ApplySummary, ApplyError>
where
    C: SecretsClient + ?Sized,
    M: PasswordManager + ?Sized,
    P: FnMut(&str) -> Result<bool, ApplyError>,
{
    let mut summary = ApplySummary::default();

    for vault in &plan.vaults {
        if !manager.vault_exists(&vault.name)? {
            info!(vault = %vault.name, "creating vault");
            manager.create_vault(&vault.name)?;
        }

        let mut seen = HashSet::new();
        for item in &vault.items {
            if !seen.insert(item.name.as_str()) {
                warn!(vault = %vault.name, item = %item.name, "duplicate item name, skipping");
                summary.warnings += 1;
                continue;
            }
            if item.fields.is_empty() {
                warn!(vault = %vault.name, item = %item.name, "item has no fields, skipping");
                summary.warnings += 1;
                continue;
            }

            let fields = resolve_fields(client, item, &mut summary)?;
            apply_item(&vault.name, &item.name, &fields, manager, options, &mut confirm, &mut summary)?;
        }
    }

    info!(
        updated = summary.updated,
        skipped = summary.skipped,
        up_to_date = summary.up_to_date,
        warnings = summary.warnings,
        "migration applied"
    );
    Ok(summary)
}

fn resolve_fields<C>(client: &C, item: &Item, summary: &mut ApplySummary) -> Result<Vec<FieldValue>, ApplyError>
where
    C: SecretsClient + ?Sized,
{
    let mut names = HashSet::new();
    let mut fields = Vec::with_capacity(item.fields.len());
    for field in &item.fields {
        if !names.insert(field.name.as_str()) {
            warn!(item = %item.name, field = %field.name, "duplicate field name, skipping");
            summary.warnings += 1;
            continue;
        }
        let path = parse_reference(&field.reference)?;
        let secret = client.read_secret(&path).map_err(|source| ApplyError::Read {
            reference: field.reference.clone(),
            source,
        })?;
        fields.push(FieldValue {
            name: field.name.clone(),
            value: secret.data,
            concealed: field.concealed,
        });
    }
    Ok(fields)
}

fn apply_item<M, P>(
    vault: &str,
    item: &str,
    fields: &[FieldValue],
    manager: &mut M,
    options: ApplyOptions,
    confirm: &mut P,
    summary: &mut ApplySummary,
) -> Result<(), ApplyError>
where
    M: PasswordManager + ?Sized,
    P: FnMut(&str) -> Result<bool, ApplyError>,
{
    let Some(current) = manager.item_fields(vault, item)? else {
        debug!(vault, item, "creating item");
        manager.create_item(vault, item, fields)?;
        summary.updated += fields.len();
        return Ok(());
    };

    for field in fields {
        match current.get(&field.name) {
            Some(value) if *value == field.value => summary.up_to_date += 1,
            None => {
                manager.set_field(vault, item, field)?;
                summary.updated += 1;
            }
            Some(_) => {
                let overwrite = options.force_update
                    || confirm(&format!(
                        "Field '{}' of item '{item}' in vault '{vault}' has a different value, overwrite it?",
                        field.name
                    ))?;
                if overwrite {
                    manager.set_field(vault, item, field)?;
                    summary.updated += 1;
                } else {
                    summary.skipped += 1;
                }
            }
        }
    }
    Ok(())
}
