use serde::{Deserialize, Serialize};

pub const DEFAULT_CHANNEL: &str = "live";
pub const PRODUCTION_CHANNEL_NAMES: &[&str] = &["live", "production"];

pub fn is_production_channel(channel: &str) -> bool {
    let lower = channel.trim().to_ascii_lowercase();
    PRODUCTION_CHANNEL_NAMES.contains(&lower.as_str())
}

/// Persisted per-variant rules for updating and keeping installed versions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetentionPolicy {
    pub delete_existing_version: bool,
    pub force_update: bool,
    pub always_run_latest: bool,
    pub only_keep_latest: bool,
    pub preferred_channel: String,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            delete_existing_version: false,
            force_update: false,
            always_run_latest: false,
            only_keep_latest: true,
            preferred_channel: DEFAULT_CHANNEL.to_string(),
        }
    }
}
