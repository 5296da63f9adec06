//! [`PasswordManager`] backed by the 1Password CLI (`op`).
//!
//! Field values travel to `op` as JSON item templates on stdin and the session
//! token as an `OP_SESSION_*` environment variable, so neither shows up in the
//! process list.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::PasswordManagerError;
use crate::migrate::apply::{FieldValue, PasswordManager};

pub const DEFAULT_PROGRAM: &str = "op";

const ITEM_CATEGORY: &str = "SECURE_NOTE";

#[derive(Debug, Deserialize)]
struct OpItem {
    #[serde(default)]
    fields: Vec<OpField>,
}

#[derive(Debug, Deserialize)]
struct OpField {
    label: Option<String>,
    value: Option<String>,
}

/// Session obtained from `op signin`, exported to every later call.
struct Session {
    variable: String,
    token: Zeroizing<String>,
}

pub struct OnePasswordCli {
    program: PathBuf,
    session: Option<Session>,
}

impl OnePasswordCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            session: None,
        }
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Signs in to `address` interactively and keeps the session for later calls.
    /// With the desktop app integration `op` prints no session and none is kept.
    pub fn sign_in(&mut self, address: &str) -> Result<(), PasswordManagerError> {
        let output = Command::new(&self.program)
            .args(["signin", "--account", address])
            .stdin(Stdio::inherit())
            .stderr(Stdio::inherit())
            .stdout(Stdio::piped())
            .output()
            .map_err(|source| self.spawn_error(source))?;

        if !output.status.success() {
            return Err(PasswordManagerError::Command {
                command: "op signin".to_string(),
                stderr: format!("exited with {}", output.status),
            });
        }

        let stdout = Zeroizing::new(String::from_utf8_lossy(&output.stdout).into_owned());
        self.session = parse_session(&stdout);
        debug!(address, session = self.session.is_some(), "signed in to 1Password");
        Ok(())
    }

    fn spawn_error(&self, source: std::io::Error) -> PasswordManagerError {
        PasswordManagerError::Spawn {
            program: self.program.display().to_string(),
            source,
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(&self.program);
        command.args(args);
        if let Some(session) = &self.session {
            command.env(&session.variable, session.token.as_str());
        }
        command.stdin(Stdio::null());
        command
    }

    /// Runs `op`, feeding `input` on stdin, and returns stdout or the trimmed
    /// stderr when it failed.
    fn run(&self, args: &[&str], input: Option<&[u8]>) -> Result<Result<String, String>, PasswordManagerError> {
        debug!(command = %describe(args), "running op");
        let mut command = self.command(args);
        let output = match input {
            None => command.output(),
            Some(input) => command
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .and_then(|mut child| {
                    if let Some(mut stdin) = child.stdin.take() {
                        stdin.write_all(input)?;
                    }
                    child.wait_with_output()
                }),
        }
        .map_err(|source| self.spawn_error(source))?;

        if output.status.success() {
            Ok(Ok(String::from_utf8_lossy(&output.stdout).into_owned()))
        } else {
            Ok(Err(String::from_utf8_lossy(&output.stderr).trim().to_string()))
        }
    }

    fn run_checked(&self, args: &[&str], input: Option<&[u8]>) -> Result<String, PasswordManagerError> {
        self.run(args, input)?.map_err(|stderr| PasswordManagerError::Command {
            command: describe(args),
            stderr,
        })
    }

    /// Item JSON as `op item get` prints it, `None` when there is no such item.
    fn get_item(&self, vault: &str, item: &str) -> Result<Option<Zeroizing<String>>, PasswordManagerError> {
        match self.run(&["item", "get", item, "--vault", vault, "--format", "json"], None)? {
            Ok(stdout) => Ok(Some(Zeroizing::new(stdout))),
            Err(stderr) if is_missing(&stderr, "an item") => Ok(None),
            Err(stderr) => Err(PasswordManagerError::Command {
                command: "op item get".to_string(),
                stderr,
            }),
        }
    }
}

/// Reads the `export OP_SESSION_<account>="<token>"` line `op signin` prints.
fn parse_session(stdout: &str) -> Option<Session> {
    stdout.lines().find_map(|line| {
        let (variable, token) = line.trim().strip_prefix("export ")?.split_once('=')?;
        if !variable.starts_with("OP_SESSION_") {
            return None;
        }
        let token = token.trim_matches('"');
        (!token.is_empty()).then(|| Session {
            variable: variable.to_string(),
            token: Zeroizing::new(token.to_string()),
        })
    })
}

/// `op` reports unknown vaults and items as `"<name>" isn't a vault ...` and
/// `"<name>" isn't an item ...`.
fn is_missing(stderr: &str, kind: &str) -> bool {
    stderr.contains(&format!("isn't {kind}"))
}

/// First three words of an `op` invocation.
fn describe(args: &[&str]) -> String {
    let words: Vec<&str> = args.iter().take(3).copied().collect();
    format!("op {}", words.join(" "))
}

fn field_type(field: &FieldValue) -> &'static str {
    if field.concealed {
        "CONCEALED"
    } else {
        "STRING"
    }
}

fn item_template(item: &str, fields: &[FieldValue]) -> Value {
    let fields: Vec<Value> = fields
        .iter()
        .map(|field| {
            json!({
                "label": field.name,
                "type": field_type(field),
                "value": field.value,
            })
        })
        .collect();
    json!({
        "title": item,
        "category": ITEM_CATEGORY,
        "fields": fields,
    })
}

/// Sets `field` on an item fetched with `op item get`, adding it when the item
/// has no field with that label.
fn update_field(item: &mut Value, field: &FieldValue) {
    let entry = json!({
        "label": field.name,
        "type": field_type(field),
        "value": field.value,
    });
    let Some(object) = item.as_object_mut() else {
        return;
    };
    let fields = object.entry("fields").or_insert_with(|| Value::Array(Vec::new()));
    let Some(fields) = fields.as_array_mut() else {
        return;
    };

    match fields
        .iter()
        .position(|existing| existing.get("label").and_then(Value::as_str) == Some(field.name.as_str()))
    {
        Some(index) => {
            fields[index]["value"] = entry["value"].clone();
            fields[index]["type"] = entry["type"].clone();
        }
        None => fields.push(entry),
    }
}

fn parse_item_fields(stdout: &str) -> Result<HashMap<String, String>, serde_json::Error> {
    let parsed: OpItem = serde_json::from_str(stdout)?;
    Ok(parsed
        .fields
        .into_iter()
        .filter_map(|field| Some((field.label?, field.value.unwrap_or_default())))
        .collect())
}

fn to_input(command: &str, value: &Value) -> Result<Zeroizing<Vec<u8>>, PasswordManagerError> {
    serde_json::to_vec(value)
        .map(Zeroizing::new)
        .map_err(|source| PasswordManagerError::Output {
            command: command.to_string(),
            source,
        })
}

impl PasswordManager for OnePasswordCli {
    fn vault_exists(&mut self, vault: &str) -> Result<bool, PasswordManagerError> {
        match self.run(&["vault", "get", vault, "--format", "json"], None)? {
            Ok(_) => Ok(true),
            Err(stderr) if is_missing(&stderr, "a vault") => Ok(false),
            Err(stderr) => Err(PasswordManagerError::Command {
                command: "op vault get".to_string(),
                stderr,
            }),
        }
    }

    fn create_vault(&mut self, vault: &str) -> Result<(), PasswordManagerError> {
        self.run_checked(&["vault", "create", vault], None)?;
        Ok(())
    }

    fn item_fields(
        &mut self,
        vault: &str,
        item: &str,
    ) -> Result<Option<HashMap<String, String>>, PasswordManagerError> {
        let Some(stdout) = self.get_item(vault, item)? else {
            return Ok(None);
        };
        parse_item_fields(&stdout)
            .map(Some)
            .map_err(|source| PasswordManagerError::Output {
                command: "op item get".to_string(),
                source,
            })
    }

    fn create_item(&mut self, vault: &str, item: &str, fields: &[FieldValue]) -> Result<(), PasswordManagerError> {
        let input = to_input("op item create", &item_template(item, fields))?;
        self.run_checked(&["item", "create", "--vault", vault], Some(&input))?;
        Ok(())
    }

    fn set_field(&mut self, vault: &str, item: &str, field: &FieldValue) -> Result<(), PasswordManagerError> {
        let stdout = self.get_item(vault, item)?.ok_or_else(|| PasswordManagerError::Command {
            command: "op item get".to_string(),
            stderr: format!("item {item} disappeared from vault {vault}"),
        })?;
        let mut current: Value = serde_json::from_str(&stdout).map_err(|source| PasswordManagerError::Output {
            command: "op item get".to_string(),
            source,
        })?;
        update_field(&mut current, field);

        let input = to_input("op item edit", &current)?;
        self.run_checked(&["item", "edit", item, "--vault", vault], Some(&input))?;
        Ok(())
    }
}
