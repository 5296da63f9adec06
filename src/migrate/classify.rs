//! Naming heuristics deciding how secrets are laid out in 1Password.

use crate::tree::{Dir, Tree};

/// Field names whose values are safe to show unmasked.
const NON_CONCEALED_FIELDS: &[&str] = &[
    "user",
    "username",
    "user-name",
    "login",
    "email",
    "host",
    "hostname",
    "port",
    "name",
    "url",
    "uri",
    "endpoint",
    "address",
    "region",
    "database",
    "db-name",
    "access-key-id",
    "client-id",
    "account-id",
    "app-id",
    "fingerprint.pgp",
];

/// Names that on their own identify a credential field of a larger record.
const CREDENTIAL_FIELDS: &[&str] = &[
    "password",
    "passwd",
    "pass",
    "passphrase",
    "api-key",
    "apikey",
    "token",
    "access-token",
    "refresh-token",
    "secret",
    "secret-key",
    "client-secret",
    "private-key",
    "credential",
    "credentials",
    "key",
];

fn normalize(name: &str) -> String {
    name.replace('_', "-").to_lowercase()
}

fn matches_any(name: &str, list: &[&str]) -> bool {
    let name = normalize(name);
    list.iter().any(|entry| *entry == name)
}

/// Whether a field should be masked in 1Password. Unknown names are masked.
pub fn should_be_concealed(name: &str) -> bool {
    !matches_any(name, NON_CONCEALED_FIELDS)
}

fn is_credential_field(name: &str) -> bool {
    matches_any(name, CREDENTIAL_FIELDS)
}

/// Decides whether the secrets of `dir` belong together as the fields of one
/// item, or should each become an item of their own.
pub fn is_single_item(tree: &Tree, dir: &Dir) -> bool {
    if !dir.sub_dirs.is_empty() {
        return false;
    }
    if dir.secrets.len() < 2 {
        return true;
    }

    let names: Vec<&str> = tree.secrets_in(dir).map(|secret| secret.name.as_str()).collect();

    // A plain field next to masked ones looks like one record, e.g. username + password.
    if names.iter().any(|name| !should_be_concealed(name)) {
        return true;
    }
    names.iter().all(|name| is_credential_field(name))
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn flat_dir(names: &[&str]) -> (Tree, Uuid) {
        let mut tree = Tree::new("company", Uuid::new_v4(), "app");
        let root = tree.root().id;
        let dir = tree.add_dir(root, Uuid::new_v4(), "dir").unwrap();
        for name in names {
            tree.add_secret(dir, Uuid::new_v4(), *name).unwrap();
        }
        (tree, dir)
    }

    #[test]
    fn concealment_ignores_case_and_underscores() {
        assert!(!should_be_concealed("access_key_id"));
        assert!(!should_be_concealed("access-key-id"));
        assert!(!should_be_concealed("USERNAME"));
        assert!(!should_be_concealed("fingerprint.pgp"));
        assert!(should_be_concealed("secret_access_key"));
        assert!(should_be_concealed("something-unknown"));
    }

    #[test]
    fn zero_or_one_secret_is_a_single_item() {
        let (tree, dir) = flat_dir(&[]);
        assert!(is_single_item(&tree, tree.dir(dir).unwrap()));
        let (tree, dir) = flat_dir(&["stripe-api-key"]);
        assert!(is_single_item(&tree, tree.dir(dir).unwrap()));
    }

    #[test]
    fn mixed_plain_and_masked_fields_form_one_item() {
        let (tree, dir) = flat_dir(&["username", "db_password", "random-blob"]);
        assert!(is_single_item(&tree, tree.dir(dir).unwrap()));
    }

    #[test]
    fn credential_only_fields_form_one_item() {
        let (tree, dir) = flat_dir(&["password", "API_KEY", "token"]);
        assert!(is_single_item(&tree, tree.dir(dir).unwrap()));
    }

    #[test]
    fn unrelated_masked_secrets_stay_separate() {
        let (tree, dir) = flat_dir(&["stripe-api-key", "aws-secret-access-key", "db-password"]);
        assert!(!is_single_item(&tree, tree.dir(dir).unwrap()));
    }

    #[test]
    fn directories_with_children_are_never_single_items() {
        let (mut tree, dir) = flat_dir(&["username", "password"]);
        tree.add_dir(dir, Uuid::new_v4(), "nested").unwrap();
        assert!(!is_single_item(&tree, tree.dir(dir).unwrap()));
    }
}
