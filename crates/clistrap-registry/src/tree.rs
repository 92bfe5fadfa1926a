use std::collections::BTreeMap;

use anyhow::Result;

use crate::model::{ConfigValue, KeyPath};

/// A key in the desired configuration: the values it should hold and its
/// child keys by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyNode {
    pub values: Vec<ConfigValue>,
    pub subkeys: BTreeMap<String, KeyNode>,
}

impl KeyNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, value: ConfigValue) -> Self {
        self.set_value(value);
        self
    }

    pub fn subkey(mut self, name: &str, node: KeyNode) -> Self {
        match self.subkeys.remove(name) {
            Some(mut existing) => {
                existing.merge(node);
                self.subkeys.insert(name.to_string(), existing);
            }
            None => {
                self.subkeys.insert(name.to_string(), node);
            }
        }
        self
    }

    /// Replaces a value with the same name, or appends it.
    pub fn set_value(&mut self, value: ConfigValue) {
        match self
            .values
            .iter_mut()
            .find(|current| current.name.matches(&value.name))
        {
            Some(current) => *current = value,
            None => self.values.push(value),
        }
    }

    pub fn merge(&mut self, other: KeyNode) {
        for value in other.values {
            self.set_value(value);
        }
        for (name, node) in other.subkeys {
            match self.subkeys.get_mut(&name) {
                Some(existing) => existing.merge(node),
                None => {
                    self.subkeys.insert(name, node);
                }
            }
        }
    }
}

/// The keys and values a caller wants present in a store. Built fresh per run
/// and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredConfigTree {
    roots: BTreeMap<KeyPath, KeyNode>,
}

impl DesiredConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: KeyPath, node: KeyNode) {
        let existing = self
            .roots
            .keys()
            .find(|current| current.is_same(&path))
            .cloned();
        match existing.and_then(|key| self.roots.get_mut(&key)) {
            Some(current) => current.merge(node),
            None => {
                self.roots.insert(path, node);
            }
        }
    }

    pub fn merge(&mut self, other: DesiredConfigTree) {
        for (path, node) in other.roots {
            self.insert(path, node);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Depth-first, parents before children.
    pub fn walk<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&KeyPath, &KeyNode),
    {
        fn descend<F>(path: &KeyPath, node: &KeyNode, visit: &mut F) -> Result<()>
        where
            F: FnMut(&KeyPath, &KeyNode),
        {
            visit(path, node);
            for (name, child) in &node.subkeys {
                descend(&path.join(name)?, child, visit)?;
            }
            Ok(())
        }

        for (path, node) in &self.roots {
            descend(path, node, &mut visit)?;
        }
        Ok(())
    }

    /// Every key path the tree requires to exist.
    pub fn key_paths(&self) -> Result<Vec<KeyPath>> {
        let mut paths = Vec::new();
        self.walk(|path, _| paths.push(path.clone()))?;
        Ok(paths)
    }

    /// Desired values per key path, for keys that carry any.
    pub fn desired_values(&self) -> Result<Vec<(KeyPath, Vec<ConfigValue>)>> {
        let mut desired = Vec::new();
        self.walk(|path, node| {
            if !node.values.is_empty() {
                desired.push((path.clone(), node.values.clone()));
            }
        })?;
        Ok(desired)
    }
}
