use serde::{Deserialize, Serialize};

/// One interchangeable base URL. `priority` is a stagger weight: a probe
/// against this endpoint starts `priority` stagger units after the race
/// begins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    #[serde(default)]
    pub priority: u32,
}

impl Endpoint {
    pub fn new(base_url: impl Into<String>, priority: u32) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            priority,
        }
    }

    pub fn join(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

pub fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    format!("{base}/{path}")
}

/// Known studio build served at `/versionStudio` by every healthy CDN mirror.
pub const CDN_PROBE_PATH: &str = "/versionStudio";
pub const CDN_PROBE_EXPECTED_BODY: &str = "version-012732894899482c";

pub fn default_cdn_mirrors() -> Vec<Endpoint> {
    vec![
        Endpoint::new("https://setup.rbxcdn.com", 0),
        Endpoint::new("https://setup-aws.rbxcdn.com", 2),
        Endpoint::new("https://setup-ak.rbxcdn.com", 2),
        Endpoint::new("https://roblox-setup.cachefly.net", 2),
        Endpoint::new("https://setup-cfly.rbxcdn.com", 2),
        Endpoint::new("https://s3.amazonaws.com/setup.roblox.com", 4),
    ]
}

pub fn default_settings_mirrors() -> Vec<Endpoint> {
    vec![
        Endpoint::new("https://clientsettingscdn.roblox.com", 0),
        Endpoint::new("https://clientsettings.roblox.com", 2),
    ]
}
