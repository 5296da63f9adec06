use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("invalid path '{path}': {reason}")]
    Invalid { path: String, reason: String },
}

impl PathError {
    pub(crate) fn invalid(path: &str, reason: impl Into<String>) -> Self {
        PathError::Invalid {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("directory {0} is not part of the tree")]
    DirNotFound(Uuid),
    #[error("secret {0} is not part of the tree")]
    SecretNotFound(Uuid),
    #[error(transparent)]
    Path(#[from] PathError),
}

/// Failures reported by a [`crate::client::SecretsClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("store is locked")]
    Locked,
    #[error("store does not exist, run 'secrethub init' first")]
    NotInitialized,
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("crypto failure: {0}")]
    Crypto(String),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(
        "vault name '{name}' is derived from both '{first}' and '{second}', rename one of them before migrating"
    )]
    VaultNameCollision {
        name: String,
        first: String,
        second: String,
    },
    #[error("plan file {} already exists, use --force to overwrite it", .0.display())]
    AlreadyExists(PathBuf),
    #[error("could not read plan file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write plan file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse plan file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("could not encode plan: {0}")]
    Encode(serde_yaml::Error),
    #[error("plan file {} is invalid:\n  {}", .path.display(), .problems.join("\n  "))]
    Invalid {
        path: PathBuf,
        problems: Vec<String>,
    },
    #[error(transparent)]
    Tree(#[from] TreeError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("no value given for template variable(s): {}", .0.join(", "))]
    UnknownVariables(Vec<String>),
    #[error("template variable '{name}' has {count} values, expected exactly one")]
    AmbiguousVariable { name: String, count: usize },
    #[error("invalid variable definition '{0}', expected name=value")]
    InvalidVariable(String),
    #[error("line {line}: {reason}")]
    EnvFile { line: usize, reason: String },
    #[error(transparent)]
    Path(#[from] PathError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MigrationError {
    #[error(
        "the plan has no mapping for the following reference(s), add them to the plan file and try again:\n  {}",
        .0.join("\n  ")
    )]
    MissingReferences(Vec<String>),
    #[error("no values given for variable(s): {}", .0.join(", "))]
    UnknownVariables(Vec<String>),
    #[error(
        "the following reference(s) map to destinations that cannot be expressed with the same variables:\n  {}",
        .0.join("\n  ")
    )]
    Inconsistent(Vec<String>),
    #[error("{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n"))]
    Several(Vec<MigrationError>),
}

#[derive(Debug, Error)]
pub enum PasswordManagerError {
    #[error("could not run '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("'{command}' failed: {stderr}")]
    Command { command: String, stderr: String },
    #[error("unexpected output from '{command}': {source}")]
    Output {
        command: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("could not read {reference}: {source}")]
    Read {
        reference: String,
        source: ClientError,
    },
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Manager(#[from] PasswordManagerError),
    #[error("prompt failed: {0}")]
    Prompt(String),
}

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("could not read {path}: {source}")]
    Read { path: String, source: ClientError },
    #[error("{name}: {source}")]
    Variable { name: String, source: TemplateError },
    #[error(transparent)]
    Template(#[from] TemplateError),
}
