use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::model::{ConfigValue, KeyPath, KeyState};
use crate::store::ConfigStore;
use crate::tree::DesiredConfigTree;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileFailure {
    pub path: KeyPath,
    pub operation: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created_keys: Vec<KeyPath>,
    pub written: Vec<(KeyPath, Vec<ConfigValue>)>,
    pub unchanged_values: usize,
    pub failures: Vec<ReconcileFailure>,
}

impl ReconcileReport {
    pub fn value_writes(&self) -> usize {
        self.written.iter().map(|(_, values)| values.len()).sum()
    }

    pub fn is_noop(&self) -> bool {
        self.created_keys.is_empty() && self.written.is_empty()
    }
}

/// Converges a store towards a [`DesiredConfigTree`] without ever removing
/// anything the tree does not mention.
///
/// Not safe to run concurrently against overlapping key paths.
pub struct ConfigReconciler<'s> {
    store: &'s mut dyn ConfigStore,
}

impl<'s> ConfigReconciler<'s> {
    pub fn new(store: &'s mut dyn ConfigStore) -> Self {
        Self { store }
    }

    pub fn reconcile(&mut self, tree: &DesiredConfigTree) -> Result<ReconcileReport> {
        let key_paths = tree.key_paths()?;
        self.reconcile_paths(tree, &key_paths)
    }

    /// Lists `key_paths`, creates the missing ones, re-lists, then writes only
    /// the desired values that differ from the store.
    pub fn reconcile_paths(
        &mut self,
        tree: &DesiredConfigTree,
        key_paths: &[KeyPath],
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let listed = self
            .store
            .list(key_paths)
            .context("failed to list configuration keys")?;
        for state in listed.iter().filter(|state| !state.exists) {
            match self.store.create_key(&state.path) {
                Ok(()) => {
                    debug!(key = %state.path, "created key");
                    report.created_keys.push(state.path.clone());
                }
                Err(err) => {
                    warn!(key = %state.path, error = %format!("{err:#}"), "failed to create key");
                    report.failures.push(ReconcileFailure {
                        path: state.path.clone(),
                        operation: "create key",
                        error: format!("{err:#}"),
                    });
                }
            }
        }

        let current: HashMap<String, KeyState> = if report.created_keys.is_empty() {
            index_states(listed)
        } else {
            index_states(
                self.store
                    .list(key_paths)
                    .context("failed to re-list configuration keys")?,
            )
        };

        let mut staged = Vec::new();
        for (path, desired) in tree.desired_values()? {
            let Some(state) = current.get(&path.identity()).filter(|state| state.exists) else {
                continue;
            };
            let changes = diff_values(state, &desired);
            report.unchanged_values += desired.len() - changes.len();
            if !changes.is_empty() {
                staged.push((path, changes));
            }
        }

        for (path, values) in staged {
            match self.store.put_values(&path, &values) {
                Ok(()) => {
                    debug!(key = %path, values = values.len(), "wrote values");
                    report.written.push((path, values));
                }
                Err(err) => {
                    warn!(key = %path, error = %format!("{err:#}"), "failed to write values");
                    report.failures.push(ReconcileFailure {
                        path,
                        operation: "write values",
                        error: format!("{err:#}"),
                    });
                }
            }
        }

        info!(
            created = report.created_keys.len(),
            written = report.value_writes(),
            unchanged = report.unchanged_values,
            failed = report.failures.len(),
            "configuration reconciled"
        );
        Ok(report)
    }
}

/// Values from `desired` that are absent from `state` or do not
/// [match](ConfigValue::matches) the stored value. A key without any values receives the full
/// desired set.
pub fn diff_values(state: &KeyState, desired: &[ConfigValue]) -> Vec<ConfigValue> {
    if state.values.is_empty() {
        return desired.to_vec();
    }
    desired
        .iter()
        .filter(|wanted| {
            state
                .value(&wanted.name)
                .map_or(true, |current| !current.matches(wanted))
        })
        .cloned()
        .collect()
}

fn index_states(states: Vec<KeyState>) -> HashMap<String, KeyState> {
    states
        .into_iter()
        .map(|state| (state.path.identity(), state))
        .collect()
}
