//! `{{ path }}` template tags and `$var` placeholders.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::error::TemplateError;
use crate::paths::SecretPath;

/// Environment variables with this prefix define template variables.
pub const VAR_ENV_PREFIX: &str = "SECRETHUB_VAR_";

pub(crate) fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"\{\{\s*([^{}\s]+)\s*\}\}").expect("tag pattern is valid"))
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").expect("placeholder pattern is valid")
    })
}

fn placeholder_name<'a>(caps: &Captures<'a>) -> &'a str {
    caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str())
}

/// Names of the placeholders in `text`, in order of first appearance.
pub fn placeholders(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in placeholder_regex().captures_iter(text) {
        let name = placeholder_name(&caps).to_lowercase();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Replaces every placeholder with its value from `values`. Unknown names are kept.
pub fn substitute(text: &str, values: &HashMap<String, String>) -> String {
    placeholder_regex()
        .replace_all(text, |caps: &Captures<'_>| {
            let name = placeholder_name(caps).to_lowercase();
            values
                .get(&name)
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Template variables; each name can hold several candidate values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    values: BTreeMap<String, Vec<String>>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `name=value[,value...]` definitions.
    pub fn parse(definitions: &[String]) -> Result<Self, TemplateError> {
        let mut vars = Self::new();
        for definition in definitions {
            let (name, values) = definition
                .split_once('=')
                .filter(|(name, _)| !name.trim().is_empty())
                .ok_or_else(|| TemplateError::InvalidVariable(definition.clone()))?;
            let values: Vec<String> = values
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
            if values.is_empty() {
                return Err(TemplateError::InvalidVariable(definition.clone()));
            }
            vars.values.insert(name.trim().to_lowercase(), values);
        }
        Ok(vars)
    }

    /// Adds `SECRETHUB_VAR_<NAME>` variables from `env` that are not defined yet.
    pub fn with_env<I>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in env {
            if let Some(name) = key.strip_prefix(VAR_ENV_PREFIX) {
                if name.is_empty() || value.is_empty() {
                    continue;
                }
                self.values
                    .entry(name.to_lowercase())
                    .or_insert_with(|| vec![value]);
            }
        }
        self
    }

    pub fn insert(&mut self, name: &str, values: Vec<String>) {
        self.values.insert(name.to_lowercase(), values);
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.values.get(&name.to_lowercase()).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The only value of `name`, for contexts that cannot expand over several.
    pub fn single(&self, name: &str) -> Result<&str, TemplateError> {
        match self.get(name) {
            None => Err(TemplateError::UnknownVariables(vec![name.to_string()])),
            Some([value]) => Ok(value.as_str()),
            Some(values) => Err(TemplateError::AmbiguousVariable {
                name: name.to_string(),
                count: values.len(),
            }),
        }
    }

    /// Every combination of values for `names`; one empty map when `names` is empty.
    pub fn combinations(&self, names: &[String]) -> Result<Vec<HashMap<String, String>>, TemplateError> {
        let missing: Vec<String> = names.iter().filter(|n| self.get(n).is_none()).cloned().collect();
        if !missing.is_empty() {
            return Err(TemplateError::UnknownVariables(missing));
        }

        let mut combinations = vec![HashMap::new()];
        for name in names {
            let values = self.get(name).unwrap_or_default();
            combinations = combinations
                .into_iter()
                .flat_map(|combination| {
                    values.iter().map(move |value| {
                        let mut next = combination.clone();
                        next.insert(name.clone(), value.clone());
                        next
                    })
                })
                .collect();
        }
        Ok(combinations)
    }
}

/// Single-valued assignment of every placeholder in `text`.
fn single_values(text: &str, vars: &Variables) -> Result<HashMap<String, String>, TemplateError> {
    let mut values = HashMap::new();
    for name in placeholders(text) {
        let value = vars.single(&name)?.to_string();
        values.insert(name, value);
    }
    Ok(values)
}

/// Resolves a path that may contain placeholders into a concrete secret path.
pub fn expand_path(path: &str, vars: &Variables) -> Result<SecretPath, TemplateError> {
    let values = single_values(path, vars)?;
    Ok(SecretPath::parse(&substitute(path, &values))?)
}

fn missing_variables(template: &str, vars: &Variables) -> Vec<String> {
    let mut missing = BTreeSet::new();
    for caps in tag_regex().captures_iter(template) {
        for name in placeholders(&caps[1]) {
            if vars.get(&name).is_none() {
                missing.insert(name);
            }
        }
    }
    missing.into_iter().collect()
}

/// Replaces every `{{ path }}` tag with the value `resolve` returns for it.
pub fn render<F, E>(template: &str, vars: &Variables, mut resolve: F) -> Result<String, E>
where
    F: FnMut(&SecretPath) -> Result<String, E>,
    E: From<TemplateError>,
{
    let missing = missing_variables(template, vars);
    if !missing.is_empty() {
        return Err(TemplateError::UnknownVariables(missing).into());
    }

    let mut output = String::with_capacity(template.len());
    let mut last = 0;
    for caps in tag_regex().captures_iter(template) {
        let tag = caps.get(0).map_or(0..0, |m| m.range());
        output.push_str(&template[last..tag.start]);
        let path = expand_path(&caps[1], vars)?;
        output.push_str(&resolve(&path)?);
        last = tag.end;
    }
    output.push_str(&template[last..]);
    Ok(output)
}

/// Parses `KEY=value` lines. Blank lines and `#` comments are skipped, an
/// `export ` prefix is accepted and matching outer quotes are removed.
pub fn parse_env_file(content: &str) -> Result<Vec<(String, String)>, TemplateError> {
    let mut entries = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let (key, value) = line.split_once('=').ok_or_else(|| TemplateError::EnvFile {
            line: index + 1,
            reason: "expected KEY=value".to_string(),
        })?;

        let key = key.trim();
        let valid_key = key
            .chars()
            .enumerate()
            .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()));
        if key.is_empty() || !valid_key {
            return Err(TemplateError::EnvFile {
                line: index + 1,
                reason: format!("'{key}' is not a valid variable name"),
            });
        }

        entries.push((key.to_string(), unquote(value.trim()).to_string()));
    }
    Ok(entries)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(defs: &[&str]) -> Variables {
        Variables::parse(&defs.iter().map(|d| d.to_string()).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn placeholders_in_both_forms() {
        assert_eq!(placeholders("company/${app}/$env/db/$ENV"), vec!["app", "env"]);
        let mut values = HashMap::new();
        values.insert("env".to_string(), "prod".to_string());
        assert_eq!(substitute("company/app/${env}/db/$other", &values), "company/app/prod/db/$other");
    }

    #[test]
    fn variable_definitions() {
        let vars = vars(&["env=dev, prod", "Region=eu"]);
        assert_eq!(vars.get("env").unwrap(), ["dev", "prod"]);
        assert_eq!(vars.single("region").unwrap(), "eu");
        assert!(matches!(vars.single("env"), Err(TemplateError::AmbiguousVariable { count: 2, .. })));
        assert!(Variables::parse(&["novalue".to_string()]).is_err());
        assert!(Variables::parse(&["x=".to_string()]).is_err());
    }

    #[test]
    fn env_variables_do_not_override_flags() {
        let vars = vars(&["env=dev"]).with_env(vec![
            ("SECRETHUB_VAR_ENV".to_string(), "prod".to_string()),
            ("SECRETHUB_VAR_REGION".to_string(), "eu".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ]);
        assert_eq!(vars.single("env").unwrap(), "dev");
        assert_eq!(vars.single("region").unwrap(), "eu");
        assert!(vars.get("home").is_none());
    }

    #[test]
    fn combinations_cover_every_value() {
        let vars = vars(&["env=dev,prod", "region=eu,us"]);
        let combos = vars.combinations(&["env".to_string(), "region".to_string()]).unwrap();
        assert_eq!(combos.len(), 4);
        assert_eq!(vars.combinations(&[]).unwrap().len(), 1);
        assert_eq!(
            vars.combinations(&["missing".to_string()]),
            Err(TemplateError::UnknownVariables(vec!["missing".to_string()]))
        );
    }

    #[test]
    fn render_replaces_tags() {
        let template = "user: {{company/app/$env/user}}\npass: {{ company/app/$env/pass }}\n";
        let rendered = render::<_, TemplateError>(template, &vars(&["env=dev"]), |path| {
            Ok(format!("<{path}>"))
        })
        .unwrap();
        assert_eq!(rendered, "user: <company/app/dev/user>\npass: <company/app/dev/pass>\n");
    }

    #[test]
    fn render_lists_all_missing_variables() {
        let template = "{{ company/$app/$env/user }} {{ company/app/$zone/x }}";
        let err = render::<_, TemplateError>(template, &Variables::new(), |_| Ok(String::new())).unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnknownVariables(vec!["app".to_string(), "env".to_string(), "zone".to_string()])
        );
    }

    #[test]
    fn env_file_parsing() {
        let content = "# comment\n\nexport DB_USER=admin\nDB_PASS=\"{{ company/app/db/pass }}\"\nTOKEN='abc'\n";
        let entries = parse_env_file(content).unwrap();
        assert_eq!(
            entries,
            vec![
                ("DB_USER".to_string(), "admin".to_string()),
                ("DB_PASS".to_string(), "{{ company/app/db/pass }}".to_string()),
                ("TOKEN".to_string(), "abc".to_string()),
            ]
        );
        assert!(matches!(parse_env_file("NOVALUE"), Err(TemplateError::EnvFile { line: 1, .. })));
        assert!(parse_env_file("1KEY=x").is_err());
    }
}
