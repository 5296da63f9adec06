//! Environment variables sourced from secrets, for `run` and `env`.

use std::collections::BTreeMap;

use tracing::debug;

use crate::client::SecretsClient;
use crate::error::EnvironmentError;
use crate::paths::{SecretPath, SCHEME};
use crate::template::{expand_path, parse_env_file, render, tag_regex, Variables};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
    /// Whether the value came out of the secrets store.
    pub secret: bool,
}

fn read<C>(client: &C, path: &SecretPath) -> Result<String, EnvironmentError>
where
    C: SecretsClient + ?Sized,
{
    client
        .read_secret(path)
        .map(|secret| secret.data)
        .map_err(|source| EnvironmentError::Read {
            path: path.to_string(),
            source,
        })
}

fn resolve_reference<C>(client: &C, name: &str, path: &str, vars: &Variables) -> Result<String, EnvironmentError>
where
    C: SecretsClient + ?Sized,
{
    let path = expand_path(path, vars).map_err(|source| EnvironmentError::Variable {
        name: name.to_string(),
        source,
    })?;
    read(client, &path)
}

/// Collects the variables to hand to a child process.
///
/// Process variables are only picked up when their value is a
/// `secrethub://` reference. Every entry of the env file is included; values
/// holding a reference or `{{ path }}` tags are resolved. The env file wins
/// over the process environment.
pub fn resolve_environment<C, I>(
    client: &C,
    env_file: Option<&str>,
    process_env: I,
    vars: &Variables,
) -> Result<Vec<EnvVar>, EnvironmentError>
where
    C: SecretsClient + ?Sized,
    I: IntoIterator<Item = (String, String)>,
{
    let mut resolved = BTreeMap::new();

    for (name, value) in process_env {
        if let Some(path) = value.strip_prefix(SCHEME) {
            let value = resolve_reference(client, &name, path, vars)?;
            debug!(name = %name, "resolved process variable");
            resolved.insert(name.clone(), EnvVar { name, value, secret: true });
        }
    }

    if let Some(content) = env_file {
        for (name, value) in parse_env_file(content)? {
            let (value, secret) = if let Some(path) = value.strip_prefix(SCHEME) {
                (resolve_reference(client, &name, path, vars)?, true)
            } else if tag_regex().is_match(&value) {
                (render(&value, vars, |path| read(client, path))?, true)
            } else {
                (value, false)
            };
            resolved.insert(name.clone(), EnvVar { name, value, secret });
        }
    }

    Ok(resolved.into_values().collect())
}
