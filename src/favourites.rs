use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::sandbox::{ClientPath, PathSandbox};

/// Favourite client paths persisted as a sorted JSON array.
///
/// The file is re-read on every call. All access goes through one mutex, so
/// reads and writes from this process never interleave; writers in other
/// processes are not coordinated with.
pub struct FavouritesStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FavouritesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<BTreeSet<ClientPath>> {
        let _guard = self.lock.lock();
        self.read_unlocked()
    }

    pub fn save(&self, paths: &BTreeSet<ClientPath>) -> Result<()> {
        let _guard = self.lock.lock();
        self.write_unlocked(paths)
    }

    /// Add or remove a favourite and return the updated set.
    ///
    /// Adding requires the path to currently exist and be readable. Removing
    /// never checks the filesystem, so favourites for deleted files can
    /// still be cleared.
    pub fn set_favourite(
        &self,
        sandbox: &PathSandbox,
        path: &ClientPath,
        favourite: bool,
    ) -> Result<BTreeSet<ClientPath>> {
        if favourite {
            let absolute = sandbox.resolve_client(path)?;
            sandbox.assert_accessible(&absolute)?;
        }

        let _guard = self.lock.lock();
        let mut favourites = self.read_unlocked()?;
        if favourite {
            favourites.insert(path.clone());
        } else {
            favourites.remove(path);
        }
        self.write_unlocked(&favourites)?;
        debug!("favourite {} set to {}", path, favourite);
        Ok(favourites)
    }

    fn ensure_file(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, "[]")?;
        Ok(())
    }

    fn read_unlocked(&self) -> Result<BTreeSet<ClientPath>> {
        self.ensure_file()?;
        let contents = std::fs::read_to_string(&self.path)?;

        let items = match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                warn!("favourites file {} is not a JSON array; ignoring it", self.path.display());
                return Ok(BTreeSet::new());
            }
            Err(e) => {
                warn!("favourites file {} is malformed: {}", self.path.display(), e);
                return Ok(BTreeSet::new());
            }
        };

        Ok(items
            .iter()
            .filter_map(scalar_text)
            .filter_map(|item| ClientPath::parse(Some(&item)).ok())
            .collect())
    }

    fn write_unlocked(&self, paths: &BTreeSet<ClientPath>) -> Result<()> {
        self.ensure_file()?;
        let sorted: Vec<String> = paths.iter().map(ToString::to_string).collect();
        std::fs::write(&self.path, serde_json::to_string_pretty(&sorted)?)?;
        Ok(())
    }
}

/// Hand-edited files may hold bare numbers such as `2024`; those name a path
/// just like the quoted form. Nulls and nested values name nothing.
fn scalar_text(item: &Value) -> Option<String> {
    match item {
        Value::String(text) => Some(text.clone()),
        Value::Number(_) | Value::Bool(_) => Some(item.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
