use anyhow::Result;
use tracing::info;

use crate::model::KeyPath;
use crate::store::ConfigStore;

/// EdgeUpdate client keys; either one existing means the WebView2 runtime is
/// installed machine-wide or for the current user.
pub const WEBVIEW_CLIENT_KEYS: [&str; 2] = [
    r"HKLM\SOFTWARE\WOW6432Node\Microsoft\EdgeUpdate\Clients\{F3017226-FE2A-4295-8BDF-00C3A9A7E4C5}",
    r"HKCU\Software\Microsoft\EdgeUpdate\Clients\{F3017226-FE2A-4295-8BDF-00C3A9A7E4C5}",
];

pub fn webview_runtime_installed(store: &dyn ConfigStore) -> Result<bool> {
    let keys = WEBVIEW_CLIENT_KEYS
        .iter()
        .map(|raw| KeyPath::parse(raw))
        .collect::<Result<Vec<_>>>()?;
    let installed = store.list(&keys)?.iter().any(|state| state.exists);
    info!(installed, "checked for the WebView2 runtime");
    Ok(installed)
}
