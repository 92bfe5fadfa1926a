use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::model::{ConfigValue, KeyPath, KeyState, ValueName, ValueType};

/// A hierarchical key/value store such as the Windows registry.
///
/// Listings report the unnamed value as [`ValueName::Default`] with
/// [`ValueType::Default`]; implementations translate that pairing to their
/// native form on the way in and out.
pub trait ConfigStore {
    fn list_key(&self, path: &KeyPath) -> Result<KeyState>;

    /// Creates `path` and any missing parents.
    fn create_key(&mut self, path: &KeyPath) -> Result<()>;

    /// Writes `values` into an existing key, replacing same-named values.
    fn put_values(&mut self, path: &KeyPath, values: &[ConfigValue]) -> Result<()>;

    /// Deletes `path` with all of its subkeys.
    fn delete_key(&mut self, path: &KeyPath) -> Result<()>;

    fn delete_value(&mut self, path: &KeyPath, name: &ValueName) -> Result<()>;

    fn list(&self, paths: &[KeyPath]) -> Result<Vec<KeyState>> {
        paths.iter().map(|path| self.list_key(path)).collect()
    }
}

/// Native record of one value: an empty name is the unnamed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredValue {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredKey {
    pub path: String,
    #[serde(default)]
    pub values: Vec<StoredValue>,
}

/// In-memory store with case-insensitive key paths and a write counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStore {
    keys: BTreeMap<String, StoredKey>,
    #[serde(skip)]
    value_writes: usize,
    #[serde(skip)]
    key_creations: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of individual values written so far.
    pub fn value_writes(&self) -> usize {
        self.value_writes
    }

    pub fn key_creations(&self) -> usize {
        self.key_creations
    }

    pub fn reset_counters(&mut self) {
        self.value_writes = 0;
        self.key_creations = 0;
    }

    pub fn contains_key(&self, path: &KeyPath) -> bool {
        self.keys.contains_key(&path.identity())
    }
}

pub fn to_stored_value(value: &ConfigValue) -> StoredValue {
    let name = match &value.name {
        ValueName::Default => String::new(),
        ValueName::Named(name) => name.clone(),
    };
    StoredValue {
        name,
        value_type: value.value_type.native_tag().to_string(),
        data: value.data.clone(),
    }
}

pub fn from_stored_value(stored: &StoredValue) -> Result<ConfigValue> {
    if stored.name.is_empty() {
        return Ok(ConfigValue::default_value(stored.data.clone()));
    }
    Ok(ConfigValue::named(
        &stored.name,
        stored.data.clone(),
        ValueType::parse_native(&stored.value_type)?,
    ))
}

impl ConfigStore for MemoryStore {
    fn list_key(&self, path: &KeyPath) -> Result<KeyState> {
        let Some(stored) = self.keys.get(&path.identity()) else {
            return Ok(KeyState::missing(path.clone()));
        };
        let values = stored
            .values
            .iter()
            .map(from_stored_value)
            .collect::<Result<Vec<_>>>()?;
        Ok(KeyState {
            path: path.clone(),
            exists: true,
            values,
        })
    }

    fn create_key(&mut self, path: &KeyPath) -> Result<()> {
        let mut chain = vec![path.clone()];
        let mut current = path.parent();
        while let Some(parent) = current {
            current = parent.parent();
            chain.push(parent);
        }
        for key in chain.into_iter().rev() {
            if !self.keys.contains_key(&key.identity()) {
                self.keys.insert(
                    key.identity(),
                    StoredKey {
                        path: key.as_str().to_string(),
                        values: Vec::new(),
                    },
                );
                self.key_creations += 1;
            }
        }
        Ok(())
    }

    fn put_values(&mut self, path: &KeyPath, values: &[ConfigValue]) -> Result<()> {
        let stored = self
            .keys
            .get_mut(&path.identity())
            .ok_or_else(|| anyhow!("key does not exist: {path}"))?;
        for value in values {
            let native = to_stored_value(value);
            match stored
                .values
                .iter_mut()
                .find(|current| current.name.eq_ignore_ascii_case(&native.name))
            {
                Some(current) => *current = native,
                None => stored.values.push(native),
            }
            self.value_writes += 1;
        }
        Ok(())
    }

    fn delete_key(&mut self, path: &KeyPath) -> Result<()> {
        let identity = path.identity();
        if !self.keys.contains_key(&identity) {
            return Err(anyhow!("key does not exist: {path}"));
        }
        let prefix = format!("{identity}\\");
        self.keys
            .retain(|key, _| key != &identity && !key.starts_with(&prefix));
        Ok(())
    }

    fn delete_value(&mut self, path: &KeyPath, name: &ValueName) -> Result<()> {
        let stored = self
            .keys
            .get_mut(&path.identity())
            .ok_or_else(|| anyhow!("key does not exist: {path}"))?;
        let native = match name {
            ValueName::Default => "",
            ValueName::Named(name) => name.as_str(),
        };
        let before = stored.values.len();
        stored
            .values
            .retain(|value| !value.name.eq_ignore_ascii_case(native));
        if stored.values.len() == before {
            return Err(anyhow!("value {name} does not exist in {path}"));
        }
        Ok(())
    }
}
