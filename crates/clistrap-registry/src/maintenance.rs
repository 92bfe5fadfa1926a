use anyhow::Result;
use clistrap_core::Variant;
use tracing::{info, warn};

use crate::model::{KeyPath, ValueName};
use crate::reconcile::ReconcileFailure;
use crate::store::ConfigStore;
use crate::templates::{owned_keys, owned_values};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub deleted_values: Vec<(KeyPath, ValueName)>,
    pub deleted_keys: Vec<KeyPath>,
    pub failures: Vec<ReconcileFailure>,
}

/// Deletes the named values that are present; absent ones are ignored.
pub fn prune_values(
    store: &mut dyn ConfigStore,
    targets: &[(KeyPath, ValueName)],
) -> Result<MaintenanceReport> {
    let mut report = MaintenanceReport::default();
    for (path, name) in targets {
        let state = store.list_key(path)?;
        if !state.exists || state.value(name).is_none() {
            continue;
        }
        match store.delete_value(path, name) {
            Ok(()) => {
                info!(key = %path, value = %name, "deleted value");
                report.deleted_values.push((path.clone(), name.clone()));
            }
            Err(err) => {
                warn!(
                    key = %path,
                    value = %name,
                    error = %format!("{err:#}"),
                    "failed to delete value"
                );
                report.failures.push(ReconcileFailure {
                    path: path.clone(),
                    operation: "delete value",
                    error: format!("{err:#}"),
                });
            }
        }
    }
    Ok(report)
}

/// Removes a variant's owned values, then each of its owned keys that exists.
/// Per-key failures are recorded and skipped.
pub fn unregister(store: &mut dyn ConfigStore, variant: Variant) -> Result<MaintenanceReport> {
    let mut report = prune_values(store, &owned_values(variant)?)?;
    let keys = owned_keys(variant)?;
    for state in store.list(&keys)? {
        if !state.exists {
            continue;
        }
        match store.delete_key(&state.path) {
            Ok(()) => {
                info!(key = %state.path, "deleted key");
                report.deleted_keys.push(state.path);
            }
            Err(err) => {
                warn!(key = %state.path, error = %format!("{err:#}"), "failed to delete key");
                report.failures.push(ReconcileFailure {
                    path: state.path,
                    operation: "delete key",
                    error: format!("{err:#}"),
                });
            }
        }
    }
    Ok(report)
}
