//! Rewrites secret references in config files into 1Password references.

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::MigrationError;
use crate::migrate::plan::Plan;
use crate::paths::{parse_reference, SecretPath, SCHEME};
use crate::template::{placeholders, substitute, tag_regex, Variables};

const OP_SCHEME: &str = "op://";

pub fn op_reference(vault: &str, item: &str, field: &str) -> String {
    format!("{OP_SCHEME}{vault}/{item}/{field}")
}

fn reference_regex() -> &'static Regex {
    static REFERENCE: OnceLock<Regex> = OnceLock::new();
    REFERENCE.get_or_init(|| {
        Regex::new(
            r"secrethub://((?:[A-Za-z0-9_.\-/]|\$\{[A-Za-z_][A-Za-z0-9_]*\}|\$[A-Za-z_][A-Za-z0-9_]*)+(?::(?:latest|[0-9]+))?)",
        )
        .expect("reference pattern is valid")
    })
}

/// Maps secret paths to the 1Password references their values move to.
#[derive(Debug, Clone, Default)]
pub struct ReferenceMap {
    entries: HashMap<String, String>,
}

impl ReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_plan(plan: &Plan) -> Self {
        let mut map = Self::new();
        for vault in &plan.vaults {
            for item in &vault.items {
                for field in &item.fields {
                    match parse_reference(&field.reference) {
                        Ok(path) => {
                            map.entries.insert(
                                path.without_version().to_string(),
                                op_reference(&vault.name, &item.name, &field.name),
                            );
                        }
                        Err(err) => warn!(%err, "skipping plan field"),
                    }
                }
            }
        }
        map
    }

    /// Adds a mapping; `source` may carry the `secrethub://` prefix.
    pub fn insert(&mut self, source: &str, destination: &str) {
        let source = source.strip_prefix(SCHEME).unwrap_or(source);
        self.entries.insert(source.to_string(), destination.to_string());
    }

    pub fn get(&self, path: &SecretPath) -> Option<&str> {
        self.entries
            .get(&path.without_version().to_string())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// `{{ path }}` tags in template files.
    Template,
    /// `secrethub://path` values, as found in env files.
    Reference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub output: String,
    pub replaced: usize,
}

#[derive(Default)]
struct Failures {
    unknown: BTreeSet<String>,
    missing: Vec<String>,
    inconsistent: Vec<String>,
}

impl Failures {
    /// Every kind of failure is reported, not only the first one found.
    fn into_result(self) -> Result<(), MigrationError> {
        let mut errors = Vec::new();
        if !self.unknown.is_empty() {
            errors.push(MigrationError::UnknownVariables(self.unknown.into_iter().collect()));
        }
        if !self.missing.is_empty() {
            errors.push(MigrationError::MissingReferences(self.missing));
        }
        if !self.inconsistent.is_empty() {
            errors.push(MigrationError::Inconsistent(self.inconsistent));
        }
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(MigrationError::Several(errors)),
        }
    }
}

/// Splits on `/` and `-`, keeping the separators: tokens sit at even indices.
fn split_tokens(text: &str) -> Vec<String> {
    let mut parts = vec![String::new()];
    for c in text.chars() {
        if matches!(c, '/' | '-') {
            parts.push(c.to_string());
            parts.push(String::new());
        } else if let Some(last) = parts.last_mut() {
            last.push(c);
        }
    }
    parts
}

/// Puts placeholders back into a 1Password reference: every run of whole
/// `/`- or `-`-separated tokens equal to a value is replaced by its variable.
fn templatize(reference: &str, values: &HashMap<String, String>) -> String {
    let (scheme, body) = match reference.strip_prefix(OP_SCHEME) {
        Some(body) => (OP_SCHEME, body),
        None => ("", reference),
    };

    let mut ordered: Vec<(&String, &String)> = values.iter().filter(|(_, value)| !value.is_empty()).collect();
    ordered.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));

    // (text, already a placeholder)
    let mut parts: Vec<(String, bool)> = split_tokens(body).into_iter().map(|part| (part, false)).collect();
    for (name, value) in ordered {
        let pattern = split_tokens(value);
        let mut index = 0;
        while index + pattern.len() <= parts.len() {
            let hit = parts[index..index + pattern.len()]
                .iter()
                .zip(&pattern)
                .all(|((part, placeholder), wanted)| !placeholder && part == wanted);
            if hit {
                parts.splice(index..index + pattern.len(), [(format!("${name}"), true)]);
            }
            index += 2;
        }
    }

    let mut result = scheme.to_string();
    result.extend(parts.into_iter().map(|(part, _)| part));
    result
}

/// Resolves one (possibly templated) path into its 1Password reference.
fn resolve(path: &str, map: &ReferenceMap, vars: &Variables, failures: &mut Failures) -> Option<String> {
    let path = path.strip_prefix(SCHEME).unwrap_or(path);
    let path = match path.split_once(':') {
        Some((body, version)) => {
            warn!(path, version, "1Password references are not versioned, dropping the version");
            body
        }
        None => path,
    };

    let names = placeholders(path);
    let unknown: Vec<&String> = names.iter().filter(|name| vars.get(name).is_none()).collect();
    if !unknown.is_empty() {
        failures.unknown.extend(unknown.into_iter().cloned());
        return None;
    }
    let combinations = vars.combinations(&names).ok()?;

    let mut destinations = BTreeSet::new();
    let mut complete = true;
    for values in &combinations {
        let concrete = substitute(path, values);
        let destination = SecretPath::parse(&concrete)
            .ok()
            .and_then(|secret| map.get(&secret).map(str::to_string));
        match destination {
            Some(destination) => {
                destinations.insert(templatize(&destination, values));
            }
            None => {
                let reference = format!("{SCHEME}{concrete}");
                if !failures.missing.contains(&reference) {
                    failures.missing.push(reference);
                }
                complete = false;
            }
        }
    }
    if !complete {
        return None;
    }

    if destinations.len() > 1 {
        let listed: Vec<String> = destinations.into_iter().collect();
        failures
            .inconsistent
            .push(format!("{SCHEME}{path} -> {}", listed.join(", ")));
        return None;
    }
    destinations.into_iter().next()
}

/// Rewrites every reference in `text`. Nothing is returned unless every
/// reference, for every value of its variables, has a destination.
pub fn rewrite(text: &str, syntax: Syntax, map: &ReferenceMap, vars: &Variables) -> Result<Rewrite, MigrationError> {
    let regex = match syntax {
        Syntax::Template => tag_regex(),
        Syntax::Reference => reference_regex(),
    };

    let mut failures = Failures::default();
    let mut output = String::with_capacity(text.len());
    let mut last = 0;
    let mut replaced = 0;

    for caps in regex.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let Some(captured) = caps.get(1) else {
            continue;
        };
        let (path, end) = match syntax {
            Syntax::Template => (captured.as_str(), whole.end()),
            // A reference ending a sentence keeps its full stop.
            Syntax::Reference => {
                let path = captured.as_str().trim_end_matches('.');
                (path, captured.start() + path.len())
            }
        };
        if path.starts_with(OP_SCHEME) {
            continue;
        }

        output.push_str(&text[last..whole.start()]);
        last = end;
        match resolve(path, map, vars, &mut failures) {
            Some(destination) => {
                debug!(source = path, destination = %destination, "rewrote reference");
                replaced += 1;
                match syntax {
                    Syntax::Template => output.push_str(&format!("{{{{ {destination} }}}}")),
                    Syntax::Reference => output.push_str(&destination),
                }
            }
            None => output.push_str(&text[whole.start()..end]),
        }
    }
    output.push_str(&text[last..]);

    failures.into_result()?;
    Ok(Rewrite { output, replaced })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templatize_only_replaces_whole_tokens() {
        let mut values = HashMap::new();
        values.insert("env".to_string(), "dev".to_string());
        assert_eq!(templatize("op://app-dev/db/password", &values), "op://app-$env/db/password");
        assert_eq!(templatize("op://devops/db/dev", &values), "op://devops/db/$env");
        assert_eq!(templatize("op://dev/dev-db/dev", &values), "op://$env/$env-db/$env");
    }

    #[test]
    fn templatize_matches_values_spanning_separators() {
        let mut values = HashMap::new();
        values.insert("region".to_string(), "eu-west".to_string());
        values.insert("env".to_string(), "west".to_string());
        assert_eq!(templatize("op://app-eu-west/db/west", &values), "op://app-$region/db/$env");
    }

    #[test]
    fn versions_are_dropped() {
        let mut map = ReferenceMap::new();
        map.insert("company/app/token", "op://app/token/secret");
        let rewrite = rewrite(
            "TOKEN=secrethub://company/app/token:3",
            Syntax::Reference,
            &map,
            &Variables::new(),
        )
        .unwrap();
        assert_eq!(rewrite.output, "TOKEN=op://app/token/secret");
    }
}
