use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::endpoint::{default_cdn_mirrors, default_settings_mirrors, Endpoint};

pub const APP_CONFIG_FILE_NAME: &str = "clistrap.toml";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MirrorStrategy {
    /// Staggered race, first healthy response wins.
    #[default]
    Race,
    /// Probe every mirror, keep the lowest latency.
    Measure,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Md5,
    Sha256,
}

impl ChecksumAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub cdn_mirrors: Vec<Endpoint>,
    pub settings_mirrors: Vec<Endpoint>,
    pub mirror_strategy: MirrorStrategy,
    pub stagger_unit_ms: u64,
    pub probe_timeout_secs: u64,
    pub download_timeout_secs: Option<u64>,
    pub download_concurrency: usize,
    pub checksum_algorithm: ChecksumAlgorithm,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cdn_mirrors: default_cdn_mirrors(),
            settings_mirrors: default_settings_mirrors(),
            mirror_strategy: MirrorStrategy::Race,
            stagger_unit_ms: 1000,
            probe_timeout_secs: 10,
            download_timeout_secs: None,
            download_concurrency: 4,
            checksum_algorithm: ChecksumAlgorithm::Md5,
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).context("failed to parse clistrap config")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, falling back to built-in defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config: {}", path.display()))
    }

    pub fn stagger_unit(&self) -> Duration {
        Duration::from_millis(self.stagger_unit_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn download_timeout(&self) -> Option<Duration> {
        self.download_timeout_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.cdn_mirrors.is_empty() {
            return Err(anyhow!("cdn_mirrors must list at least one endpoint"));
        }
        if self.settings_mirrors.is_empty() {
            return Err(anyhow!("settings_mirrors must list at least one endpoint"));
        }
        for endpoint in self.cdn_mirrors.iter().chain(&self.settings_mirrors) {
            let url = endpoint.base_url.trim();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(anyhow!(
                    "mirror base_url must be an http(s) URL: {}",
                    endpoint.base_url
                ));
            }
        }
        if self.download_concurrency == 0 {
            return Err(anyhow!("download_concurrency must be at least 1"));
        }
        if self.probe_timeout_secs == 0 {
            return Err(anyhow!("probe_timeout_secs must be at least 1"));
        }
        Ok(())
    }
}
