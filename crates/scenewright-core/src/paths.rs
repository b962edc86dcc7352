//! Project-relative paths.
//!
//! Path format: `res://dir/file.ext`
//!
//! A bare relative path (`dir/file.ext`) is accepted and treated the same way.
//! Absolute paths and `..` components are rejected so nothing addressed over
//! the bridge can escape the project root.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const RES_SCHEME: &str = "res://";

/// A normalized path inside the project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectPath {
    /// `/`-separated, no leading slash, no `.`/`..` segments.
    relative: String,
}

impl ProjectPath {
    /// The relative form (`dir/file.ext`).
    pub fn relative(&self) -> &str {
        &self.relative
    }

    /// Location on disk under `root`.
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        self.relative
            .split('/')
            .fold(root.to_path_buf(), |acc, segment| acc.join(segment))
    }

    /// Final path segment.
    pub fn file_name(&self) -> &str {
        self.relative
            .rsplit('/')
            .next()
            .unwrap_or(self.relative.as_str())
    }

    /// File name up to the first `.`.
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        name.split('.').next().unwrap_or(name)
    }

    pub fn has_suffix(&self, suffix: &str) -> bool {
        self.relative.ends_with(suffix)
    }
}

impl fmt::Display for ProjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{RES_SCHEME}{}", self.relative)
    }
}

impl FromStr for ProjectPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix(RES_SCHEME).unwrap_or(s);
        if rest.starts_with('/') || rest.contains('\\') || rest.contains(':') {
            return Err(PathError::OutsideProject(s.to_string()));
        }

        let mut segments = Vec::new();
        for segment in rest.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(PathError::OutsideProject(s.to_string())),
                other => segments.push(other),
            }
        }

        if segments.is_empty() {
            return Err(PathError::Empty);
        }

        Ok(Self {
            relative: segments.join("/"),
        })
    }
}

impl TryFrom<String> for ProjectPath {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ProjectPath> for String {
    fn from(path: ProjectPath) -> Self {
        path.to_string()
    }
}

/// Error parsing a project path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path must stay inside the project (use res://...), got: {0}")]
    OutsideProject(String),
    #[error("path cannot be empty")]
    Empty,
}
