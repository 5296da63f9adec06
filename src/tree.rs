//! Immutable directory-tree snapshots.
//!
//! A [`Tree`] is an arena: directories and secrets live in flat maps keyed by
//! their identifier and refer to each other by id. The root directory has no
//! parent inside the snapshot; `parent_path` holds the path above it.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::TreeError;
use crate::paths::{DirPath, SecretPath};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    pub id: Uuid,
    pub name: String,
    pub parent: Option<Uuid>,
    pub sub_dirs: Vec<Uuid>,
    pub secrets: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRef {
    pub id: Uuid,
    pub name: String,
    pub dir: Uuid,
}

#[derive(Debug, Clone)]
pub struct Tree {
    parent_path: String,
    root: Uuid,
    dirs: HashMap<Uuid, Dir>,
    secrets: HashMap<Uuid, SecretRef>,
}

impl Tree {
    /// Starts a tree whose root directory `root_name` lives under `parent_path`
    /// (a namespace for repository roots, a directory path otherwise).
    pub fn new(parent_path: impl Into<String>, root_id: Uuid, root_name: impl Into<String>) -> Self {
        let root = Dir {
            id: root_id,
            name: root_name.into(),
            parent: None,
            sub_dirs: Vec::new(),
            secrets: Vec::new(),
        };
        let mut dirs = HashMap::new();
        dirs.insert(root_id, root);
        Self {
            parent_path: parent_path.into(),
            root: root_id,
            dirs,
            secrets: HashMap::new(),
        }
    }

    pub fn add_dir(&mut self, parent: Uuid, id: Uuid, name: impl Into<String>) -> Result<Uuid, TreeError> {
        let parent_dir = self.dirs.get_mut(&parent).ok_or(TreeError::DirNotFound(parent))?;
        parent_dir.sub_dirs.push(id);
        self.dirs.insert(
            id,
            Dir {
                id,
                name: name.into(),
                parent: Some(parent),
                sub_dirs: Vec::new(),
                secrets: Vec::new(),
            },
        );
        Ok(id)
    }

    pub fn add_secret(&mut self, dir: Uuid, id: Uuid, name: impl Into<String>) -> Result<Uuid, TreeError> {
        let owner = self.dirs.get_mut(&dir).ok_or(TreeError::DirNotFound(dir))?;
        owner.secrets.push(id);
        self.secrets.insert(
            id,
            SecretRef {
                id,
                name: name.into(),
                dir,
            },
        );
        Ok(id)
    }

    pub fn root(&self) -> &Dir {
        &self.dirs[&self.root]
    }

    pub fn parent_path(&self) -> &str {
        &self.parent_path
    }

    pub fn dir(&self, id: Uuid) -> Option<&Dir> {
        self.dirs.get(&id)
    }

    pub fn secret(&self, id: Uuid) -> Option<&SecretRef> {
        self.secrets.get(&id)
    }

    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }

    pub fn secret_count(&self) -> usize {
        self.secrets.len()
    }

    /// Secrets directly inside `dir`, in insertion order.
    pub fn secrets_in<'a>(&'a self, dir: &'a Dir) -> impl Iterator<Item = &'a SecretRef> + 'a {
        dir.secrets.iter().filter_map(|id| self.secrets.get(id))
    }

    pub fn sub_dirs_of<'a>(&'a self, dir: &'a Dir) -> impl Iterator<Item = &'a Dir> + 'a {
        dir.sub_dirs.iter().filter_map(|id| self.dirs.get(id))
    }

    pub fn abs_dir_path(&self, id: Uuid) -> Result<DirPath, TreeError> {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(dir_id) = current {
            let dir = self.dirs.get(&dir_id).ok_or(TreeError::DirNotFound(dir_id))?;
            names.push(dir.name.as_str());
            current = dir.parent;
        }
        names.reverse();
        let path = format!("{}/{}", self.parent_path, names.join("/"));
        Ok(DirPath::parse(&path)?)
    }

    pub fn abs_secret_path(&self, id: Uuid) -> Result<SecretPath, TreeError> {
        let secret = self.secrets.get(&id).ok_or(TreeError::SecretNotFound(id))?;
        Ok(self.abs_dir_path(secret.dir)?.join_secret(&secret.name)?)
    }

    /// Visits every directory once, parents before children, siblings in
    /// child-list order. Stops at the first error returned by `visit`.
    pub fn walk<E, F>(&self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(&Dir) -> Result<(), E>,
    {
        self.walk_dir(self.root(), &mut visit)
    }

    fn walk_dir<E, F>(&self, dir: &Dir, visit: &mut F) -> Result<(), E>
    where
        F: FnMut(&Dir) -> Result<(), E>,
    {
        visit(dir)?;
        for child in self.sub_dirs_of(dir) {
            self.walk_dir(child, visit)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Tree, Uuid, Uuid) {
        let mut tree = Tree::new("company", Uuid::new_v4(), "app");
        let root = tree.root().id;
        let db = tree.add_dir(root, Uuid::new_v4(), "db").unwrap();
        let prod = tree.add_dir(db, Uuid::new_v4(), "prod").unwrap();
        tree.add_dir(root, Uuid::new_v4(), "aws").unwrap();
        tree.add_secret(prod, Uuid::new_v4(), "password").unwrap();
        (tree, db, prod)
    }

    #[test]
    fn absolute_paths_include_parent_path() {
        let (tree, _, prod) = sample();
        assert_eq!(tree.abs_dir_path(prod).unwrap().to_string(), "company/app/db/prod");
        assert_eq!(tree.abs_dir_path(tree.root().id).unwrap().to_string(), "company/app");
        let secret = tree.dir(prod).unwrap().secrets[0];
        assert_eq!(
            tree.abs_secret_path(secret).unwrap().to_string(),
            "company/app/db/prod/password"
        );
        assert!(matches!(
            tree.abs_dir_path(Uuid::nil()),
            Err(TreeError::DirNotFound(_))
        ));
    }

    #[test]
    fn walk_is_pre_order() {
        let (tree, _, _) = sample();
        let mut seen = Vec::new();
        tree.walk(|dir| {
            seen.push(dir.name.clone());
            Ok::<_, ()>(())
        })
        .unwrap();
        assert_eq!(seen, vec!["app", "db", "prod", "aws"]);
    }

    #[test]
    fn walk_stops_on_first_error() {
        let (tree, db, _) = sample();
        let mut visited = 0;
        let result = tree.walk(|dir| {
            visited += 1;
            if dir.id == db {
                return Err("stop");
            }
            Ok(())
        });
        assert_eq!(result, Err("stop"));
        assert_eq!(visited, 2);
    }
}
