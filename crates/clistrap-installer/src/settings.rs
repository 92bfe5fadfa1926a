use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use clistrap_core::RetentionPolicy;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledJson {
    pub document: Map<String, Value>,
    pub rewritten: bool,
}

/// Loads a JSON object file against `defaults`: missing keys are filled in,
/// unknown keys are kept, and the file is rewritten only when it changed.
/// A missing file is created from the defaults.
pub fn load_reconciled_json(path: &Path, defaults: &Map<String, Value>) -> Result<ReconciledJson> {
    let existing = match fs::read_to_string(path) {
        Ok(raw) => Some(raw),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };

    let Some(raw) = existing else {
        write_pretty_json(path, defaults)?;
        info!(file = %path.display(), "created settings file from defaults");
        return Ok(ReconciledJson {
            document: defaults.clone(),
            rewritten: true,
        });
    };

    let parsed: Value = serde_json::from_str(&raw)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;
    let Value::Object(mut document) = parsed else {
        return Err(anyhow!("{} must contain a JSON object", path.display()));
    };

    let mut changed = false;
    for (key, value) in defaults {
        if !document.contains_key(key) {
            document.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    if changed {
        write_pretty_json(path, &document)?;
        debug!(file = %path.display(), "filled missing settings keys");
    }
    Ok(ReconciledJson {
        document,
        rewritten: changed,
    })
}

pub fn write_pretty_json(path: &Path, document: &Map<String, Value>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let rendered = serde_json::to_string_pretty(document)
        .with_context(|| format!("failed to encode {}", path.display()))?;
    fs::write(path, format!("{rendered}\n"))
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn default_policy_document() -> Result<Map<String, Value>> {
    match serde_json::to_value(RetentionPolicy::default()).context("failed to encode policy")? {
        Value::Object(map) => Ok(map),
        _ => Err(anyhow!("retention policy must encode as a JSON object")),
    }
}

pub fn load_policy(path: &Path) -> Result<RetentionPolicy> {
    let reconciled = load_reconciled_json(path, &default_policy_document()?)?;
    serde_json::from_value(Value::Object(reconciled.document))
        .with_context(|| format!("invalid settings in {}", path.display()))
}

/// Updates one policy key from its textual form and persists the file.
/// Booleans accept `true`/`false`; the key must be a known policy field.
pub fn set_policy_value(path: &Path, key: &str, raw: &str) -> Result<RetentionPolicy> {
    let defaults = default_policy_document()?;
    let Some(default_value) = defaults.get(key) else {
        let known: Vec<&str> = defaults.keys().map(String::as_str).collect();
        return Err(anyhow!(
            "unknown setting '{key}'; expected one of: {}",
            known.join(", ")
        ));
    };
    let value = match default_value {
        Value::Bool(_) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => return Err(anyhow!("setting '{key}' expects true or false, got '{raw}'")),
        },
        _ => Value::String(raw.trim().to_string()),
    };

    let mut document = load_reconciled_json(path, &defaults)?.document;
    document.insert(key.to_string(), value);
    let policy: RetentionPolicy = serde_json::from_value(Value::Object(document.clone()))
        .with_context(|| format!("invalid value for '{key}'"))?;
    write_pretty_json(path, &document)?;
    info!(%key, value = %raw, "updated setting");
    Ok(policy)
}

pub fn default_fast_flags() -> Map<String, Value> {
    let flags = json!({
        "DFIntTaskSchedulerTargetFps": 240,
        "DFIntTextureQualityOverride": 3,
        "DFFlagDisableDPIScale": true,
        "DFFlagTextureQualityOverrideEnabled": true,
        "FFlagDebugGraphicsPreferD3D11": true,
        "FFlagHandleAltEnterFullscreenManually": false,
        "FFlagTaskSchedulerLimitTargetFpsTo2402": false,
        "FIntCameraMaxZoomDistance": 9999,
        "FIntDebugForceMSAASamples": 4,
    });
    match flags {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub fn load_fast_flags(path: &Path) -> Result<Map<String, Value>> {
    Ok(load_reconciled_json(path, &default_fast_flags())?.document)
}

/// Writes `flags` to the client settings file only when its content differs.
/// Returns whether the file was written.
pub fn apply_fast_flags(client_settings_path: &Path, flags: &Map<String, Value>) -> Result<bool> {
    if let Ok(raw) = fs::read_to_string(client_settings_path) {
        if let Ok(Value::Object(current)) = serde_json::from_str::<Value>(&raw) {
            if &current == flags {
                debug!(file = %client_settings_path.display(), "fast flags already applied");
                return Ok(false);
            }
        }
    }
    write_pretty_json(client_settings_path, flags)?;
    info!(file = %client_settings_path.display(), "applied fast flags");
    Ok(true)
}
