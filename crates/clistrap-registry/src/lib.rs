mod file_store;
mod maintenance;
mod model;
mod reconcile;
mod reg_command;
mod store;
mod templates;
mod tree;
mod webview;

pub use file_store::FileStore;
pub use maintenance::{prune_values, unregister, MaintenanceReport};
pub use model::{
    parse_numeric_data, ConfigValue, KeyPath, KeyState, ValueName, ValueType, KEY_SEPARATOR,
};
pub use reconcile::{diff_values, ConfigReconciler, ReconcileFailure, ReconcileReport};
pub use reg_command::{
    build_create_key_command, build_delete_key_command, build_delete_value_command,
    build_put_value_command, build_query_command, parse_query_output, run_reg_command,
    CommandOutput, RegCommandStore, RegExecutor,
};
pub use store::{
    from_stored_value, to_stored_value, ConfigStore, MemoryStore, StoredKey, StoredValue,
};
pub use templates::{
    association_tree, owned_keys, owned_values, TemplateContext, CLASSES_ROOT, ENVIRONMENTS_KEY,
};
pub use tree::{DesiredConfigTree, KeyNode};
pub use webview::{webview_runtime_installed, WEBVIEW_CLIENT_KEYS};

#[cfg(test)]
mod tests;
