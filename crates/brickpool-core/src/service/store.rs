// Durable unit store implementations
// Keyed local cache for brick inventories, injected into the engine

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use brickpool_common::Result;

/// Keyed durable cache owned by the convergence engine
///
/// Keys follow the `{unit}.bricks` contract. A `set` is not considered
/// complete until an explicit `flush` succeeds.
pub trait UnitStore {
    /// Read a value; `None` when the key has never been set
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Stage a value for the key
    fn set(&mut self, key: &str, value: Value) -> Result<()>;

    /// Commit staged values to durable storage
    fn flush(&mut self) -> Result<()>;
}

/// File-backed unit store
/// Loads the full key space at open and rewrites the file on flush
#[derive(Debug)]
pub struct FileUnitStore {
    path: PathBuf,
    entries: BTreeMap<String, Value>,
    dirty: bool,
}

impl FileUnitStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let bytes = fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            debug!("Unit store file not found, starting empty: {:?}", path);
            BTreeMap::new()
        };

        info!("Opened unit store at {:?} with {} entries", path, entries.len());

        Ok(Self {
            path,
            entries,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UnitStore for FileUnitStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        self.dirty = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let bytes = serde_json::to_vec_pretty(&self.entries)?;
        fs::write(&self.path, bytes)?;
        self.dirty = false;

        debug!("Flushed {} unit store entries to {:?}", self.entries.len(), self.path);
        Ok(())
    }
}

/// In-memory unit store for deterministic tests
#[derive(Debug, Default)]
pub struct MemoryUnitStore {
    entries: BTreeMap<String, Value>,
    flushes: usize,
}

impl MemoryUnitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `flush` has been invoked
    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}

impl UnitStore for MemoryUnitStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }
}
