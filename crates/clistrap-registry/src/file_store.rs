use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::model::{ConfigValue, KeyPath, KeyState, ValueName};
use crate::store::{ConfigStore, MemoryStore};

/// A [`MemoryStore`] persisted as pretty JSON after every mutation.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl FileStore {
    pub fn open(path: &Path) -> Result<Self> {
        let inner = match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("invalid configuration store: {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => MemoryStore::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            inner,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let rendered = serde_json::to_string_pretty(&self.inner)
            .context("failed to encode configuration store")?;
        fs::write(&self.path, format!("{rendered}\n"))
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        debug!(file = %self.path.display(), "persisted configuration store");
        Ok(())
    }
}

impl ConfigStore for FileStore {
    fn list_key(&self, path: &KeyPath) -> Result<KeyState> {
        self.inner.list_key(path)
    }

    fn create_key(&mut self, path: &KeyPath) -> Result<()> {
        self.inner.create_key(path)?;
        self.persist()
    }

    fn put_values(&mut self, path: &KeyPath, values: &[ConfigValue]) -> Result<()> {
        self.inner.put_values(path, values)?;
        self.persist()
    }

    fn delete_key(&mut self, path: &KeyPath) -> Result<()> {
        self.inner.delete_key(path)?;
        self.persist()
    }

    fn delete_value(&mut self, path: &KeyPath, name: &ValueName) -> Result<()> {
        self.inner.delete_value(path, name)?;
        self.persist()
    }
}
