//! Terminal renderings of store contents.

use chrono::{DateTime, Local, Utc};

use crate::client::SecretVersionInfo;
use crate::migrate::{ApplySummary, Plan};
use crate::tree::{Dir, Tree};

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Box-drawing rendering of `tree`, headed by `title` and followed by a count line.
pub fn render_tree(title: &str, tree: &Tree) -> String {
    let mut out = format!("{title}\n");
    render_children(tree, tree.root(), "", &mut out);

    let dirs = tree.dir_count() - 1;
    let secrets = tree.secret_count();
    out.push_str(&format!(
        "\n{dirs} {}, {secrets} {}\n",
        if dirs == 1 { "directory" } else { "directories" },
        if secrets == 1 { "secret" } else { "secrets" },
    ));
    out
}

fn render_children(tree: &Tree, dir: &Dir, prefix: &str, out: &mut String) {
    let sub_dirs: Vec<&Dir> = tree.sub_dirs_of(dir).collect();
    let secrets: Vec<&str> = tree.secrets_in(dir).map(|s| s.name.as_str()).collect();
    let total = sub_dirs.len() + secrets.len();

    for (index, child) in sub_dirs.iter().enumerate() {
        let last = index + 1 == total;
        out.push_str(&format!("{prefix}{}{}/\n", if last { "└── " } else { "├── " }, child.name));
        let nested = format!("{prefix}{}", if last { "    " } else { "│   " });
        render_children(tree, child, &nested, out);
    }
    for (index, name) in secrets.iter().enumerate() {
        let last = sub_dirs.len() + index + 1 == total;
        out.push_str(&format!("{prefix}{}{name}\n", if last { "└── " } else { "├── " }));
    }
}

/// Direct children of the tree root: directories first, with a trailing slash.
pub fn render_listing(tree: &Tree) -> String {
    let root = tree.root();
    let mut out = String::new();
    for dir in tree.sub_dirs_of(root) {
        out.push_str(&format!("{}/\n", dir.name));
    }
    for secret in tree.secrets_in(root) {
        out.push_str(&format!("{}\n", secret.name));
    }
    out
}

pub fn render_versions(versions: &[SecretVersionInfo]) -> String {
    let mut out = format!("{:<8} {}\n", "VERSION", "CREATED");
    for info in versions.iter().rev() {
        out.push_str(&format!("{:<8} {}\n", info.version, format_timestamp(info.created_at)));
    }
    out
}

pub fn render_plan_summary(plan: &Plan) -> String {
    let mut out = String::new();
    for vault in &plan.vaults {
        out.push_str(&format!("{} ({} items)\n", vault.name, vault.items.len()));
        for item in &vault.items {
            out.push_str(&format!("  {} ({} fields)\n", item.name, item.fields.len()));
        }
    }
    out
}

pub fn render_apply_summary(summary: &ApplySummary) -> String {
    format!(
        "Fields updated: {}\nFields skipped: {}\nFields already up to date: {}\nWarnings: {}\n",
        summary.updated, summary.skipped, summary.up_to_date, summary.warnings
    )
}
