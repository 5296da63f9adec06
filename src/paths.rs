//! Path grammar of the secrets hierarchy.
//!
//! Directories are addressed as `namespace/repo[/dir...]`, secrets as
//! `namespace/repo[/dir...]/name[:version]`. References embedded in plan files
//! and env files carry the [`SCHEME`] prefix.

use std::fmt;
use std::str::FromStr;

use crate::error::PathError;

/// Marks a string as a reference into the secrets store.
pub const SCHEME: &str = "secrethub://";

const SEPARATOR: char = '/';
const VERSION_SEPARATOR: char = ':';

fn validate_segment(path: &str, segment: &str) -> Result<(), PathError> {
    if segment.is_empty() {
        return Err(PathError::invalid(path, "path contains an empty segment"));
    }
    if let Some(c) = segment
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(PathError::invalid(
            path,
            format!("segment '{segment}' contains invalid character '{c}'"),
        ));
    }
    Ok(())
}

fn split_segments(path: &str) -> Result<Vec<String>, PathError> {
    let trimmed = path.trim_end_matches(SEPARATOR);
    if trimmed.is_empty() {
        return Err(PathError::invalid(path, "path is empty"));
    }
    let segments: Vec<String> = trimmed.split(SEPARATOR).map(str::to_string).collect();
    for segment in &segments {
        validate_segment(path, segment)?;
    }
    Ok(segments)
}

/// Path of a repository or a directory inside one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirPath {
    segments: Vec<String>,
}

impl DirPath {
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if path.contains(VERSION_SEPARATOR) {
            return Err(PathError::invalid(path, "directory paths cannot carry a version"));
        }
        let segments = split_segments(path)?;
        if segments.len() < 2 {
            return Err(PathError::invalid(
                path,
                "expected at least a namespace and a repository (namespace/repo)",
            ));
        }
        Ok(Self { segments })
    }

    pub fn namespace(&self) -> &str {
        &self.segments[0]
    }

    pub fn repo(&self) -> &str {
        &self.segments[1]
    }

    pub fn name(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_repo(&self) -> bool {
        self.segments.len() == 2
    }

    /// Parent directory, `None` for a repository root.
    pub fn parent(&self) -> Option<DirPath> {
        if self.is_repo() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn join_secret(&self, name: &str) -> Result<SecretPath, PathError> {
        SecretPath::parse(&format!("{self}/{name}"))
    }

    /// Reads the same path as a secret path, if it is deep enough to be one.
    pub fn as_secret(&self) -> Option<SecretPath> {
        if self.segments.len() < 3 {
            return None;
        }
        Some(SecretPath {
            segments: self.segments.clone(),
            version: None,
        })
    }
}

impl fmt::Display for DirPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl FromStr for DirPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DirPath::parse(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Version {
    Latest,
    Number(u32),
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Latest => f.write_str("latest"),
            Version::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Path of a secret, optionally pinned to a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SecretPath {
    segments: Vec<String>,
    version: Option<Version>,
}

impl SecretPath {
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let (body, version) = match path.split_once(VERSION_SEPARATOR) {
            Some((body, version)) => (body, Some(parse_version(path, version)?)),
            None => (path, None),
        };
        let segments = split_segments(body)?;
        if segments.len() < 3 {
            return Err(PathError::invalid(
                path,
                "expected a secret inside a repository (namespace/repo/secret)",
            ));
        }
        Ok(Self { segments, version })
    }

    pub fn namespace(&self) -> &str {
        &self.segments[0]
    }

    pub fn name(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn dir(&self) -> DirPath {
        DirPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        }
    }

    pub fn version(&self) -> Option<Version> {
        self.version
    }

    pub fn without_version(&self) -> SecretPath {
        SecretPath {
            segments: self.segments.clone(),
            version: None,
        }
    }

    /// The path prefixed with [`SCHEME`].
    pub fn reference(&self) -> String {
        format!("{SCHEME}{self}")
    }
}

fn parse_version(path: &str, version: &str) -> Result<Version, PathError> {
    if version == "latest" {
        return Ok(Version::Latest);
    }
    match version.parse::<u32>() {
        Ok(0) | Err(_) => Err(PathError::invalid(
            path,
            format!("version '{version}' is neither 'latest' nor a positive number"),
        )),
        Ok(n) => Ok(Version::Number(n)),
    }
}

impl fmt::Display for SecretPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))?;
        if let Some(version) = self.version {
            write!(f, ":{version}")?;
        }
        Ok(())
    }
}

impl FromStr for SecretPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SecretPath::parse(s)
    }
}

/// Parses a `secrethub://` reference into the secret path it points at.
pub fn parse_reference(reference: &str) -> Result<SecretPath, PathError> {
    let path = reference.strip_prefix(SCHEME).ok_or_else(|| {
        PathError::invalid(reference, format!("reference must start with '{SCHEME}'"))
    })?;
    SecretPath::parse(path)
}
