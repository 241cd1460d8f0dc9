//! Confinement of client-supplied paths to a single root directory.
//!
//! Clients never see absolute host paths. They exchange [`ClientPath`]s, which
//! are `/`-separated and relative to the root, and every crossing between the
//! two spaces re-checks that the result stays inside the root.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use nix::unistd::{access, AccessFlags};
use serde::{Serialize, Serializer};

use crate::error::{FileCityError, Result};

/// A normalized, root-relative path. The root is rendered as `/`, everything
/// else as its segments joined with `/` and no leading slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ClientPath {
    segments: Vec<String>,
}

impl ClientPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Normalize raw client input.
    ///
    /// Absent, empty, `.` and `./` all mean the root. Backslashes are treated
    /// as separators, empty and `.` segments are dropped, and `..` pops the
    /// previous segment. Ascending above the root is rejected outright, before
    /// any filesystem lookup happens.
    pub fn parse(input: Option<&str>) -> Result<Self> {
        let text = match input {
            Some(text) => text.trim(),
            None => return Ok(Self::root()),
        };
        if matches!(text, "" | "." | "./") {
            return Ok(Self::root());
        }

        let text = text.replace('\\', "/");
        let mut chars = text.chars();
        if let (Some(drive), Some(':')) = (chars.next(), chars.next()) {
            if drive.is_alphabetic() {
                return Err(FileCityError::InvalidInput("Invalid path".to_string()));
            }
        }

        let mut segments: Vec<String> = Vec::new();
        for part in text.split('/') {
            match part {
                "" | "." => continue,
                ".." => {
                    if segments.pop().is_none() {
                        return Err(FileCityError::AccessDenied("Access denied".to_string()));
                    }
                }
                _ => segments.push(part.to_string()),
            }
        }
        Ok(Self { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn first_segment(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// The containing directory, or `None` for the root itself.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(Self { segments })
    }

    /// Append a single directory entry name.
    pub fn join(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self { segments }
    }

    /// True when `self` is `dir` or lies underneath it.
    pub fn is_within(&self, dir: &ClientPath) -> bool {
        self.segments.starts_with(&dir.segments)
    }

    fn to_relative(&self) -> PathBuf {
        self.segments.iter().collect()
    }
}

impl fmt::Display for ClientPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("/")
        } else {
            f.write_str(&self.segments.join("/"))
        }
    }
}

// Canonical order is lexicographic on the string form.
impl Ord for ClientPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl PartialOrd for ClientPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for ClientPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Maps between client paths and absolute paths under a fixed root.
#[derive(Debug)]
pub struct PathSandbox {
    root: PathBuf,
}

impl PathSandbox {
    /// The root is canonicalized once; it must be an existing directory.
    pub fn new(root: &Path) -> Result<Self> {
        let root = std::fs::canonicalize(root).map_err(|e| {
            FileCityError::Config(format!("root directory {}: {}", root.display(), e))
        })?;
        if !root.is_dir() {
            return Err(FileCityError::Config(format!(
                "root directory {} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn normalize(&self, input: Option<&str>) -> Result<ClientPath> {
        ClientPath::parse(input)
    }

    /// Normalize raw input and resolve it to an absolute path inside the root.
    pub fn resolve(&self, input: Option<&str>) -> Result<PathBuf> {
        self.resolve_client(&ClientPath::parse(input)?)
    }

    /// Resolve a client path at the OS level. Symlinks are followed, so the
    /// containment check is repeated on the resolved result.
    pub fn resolve_client(&self, path: &ClientPath) -> Result<PathBuf> {
        let joined = self.root.join(path.to_relative());
        let resolved = resolve_lenient(&joined)?;
        if !resolved.starts_with(&self.root) {
            return Err(FileCityError::AccessDenied(
                "Access outside the configured root directory is denied".to_string(),
            ));
        }
        Ok(resolved)
    }

    /// Map an absolute path back into client space. Fails closed when the
    /// resolved path is not the root or one of its descendants.
    pub fn to_client_path(&self, absolute: &Path) -> Result<ClientPath> {
        let resolved = resolve_lenient(absolute)?;
        self.relative_to_root(&resolved)
    }

    /// Like [`to_client_path`](Self::to_client_path) but without following
    /// symlinks: `.` and `..` are folded lexically.
    pub fn lexical_client_path(&self, absolute: &Path) -> Result<ClientPath> {
        if !absolute.is_absolute() {
            return Err(FileCityError::InternalMapping);
        }
        let mut normalized = PathBuf::new();
        for component in absolute.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    normalized.pop();
                }
                other => normalized.push(other.as_os_str()),
            }
        }
        self.relative_to_root(&normalized)
    }

    /// Fails with "not found" for missing paths and "access denied" for paths
    /// the current process cannot read.
    pub fn assert_accessible(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(FileCityError::NotFound("Path not found".to_string()));
        }
        if !is_readable(path) {
            return Err(FileCityError::AccessDenied("Access denied".to_string()));
        }
        Ok(())
    }

    /// Normalize, resolve and require the target to exist and be readable.
    pub fn locate(&self, input: Option<&str>) -> Result<(ClientPath, PathBuf)> {
        let client = ClientPath::parse(input)?;
        let absolute = self.resolve_client(&client)?;
        self.assert_accessible(&absolute)?;
        Ok((client, absolute))
    }

    fn relative_to_root(&self, path: &Path) -> Result<ClientPath> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| FileCityError::InternalMapping)?;
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                // Client paths are UTF-8; a lossy segment would name a different file.
                Component::Normal(name) => match name.to_str() {
                    Some(name) => segments.push(name.to_string()),
                    None => return Err(FileCityError::InternalMapping),
                },
                _ => return Err(FileCityError::InternalMapping),
            }
        }
        Ok(ClientPath { segments })
    }
}

/// Readability for the current process's real uid/gid.
pub fn is_readable(path: &Path) -> bool {
    access(path, AccessFlags::R_OK).is_ok()
}

/// Canonicalize as much of `path` as exists and append the rest unchanged.
fn resolve_lenient(path: &Path) -> Result<PathBuf> {
    match std::fs::canonicalize(path) {
        Ok(resolved) => Ok(resolved),
        Err(e) => {
            let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
                return Err(e.into());
            };
            Ok(resolve_lenient(parent)?.join(name))
        }
    }
}
