use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clistrap_core::{Variant, VersionHash, APP_CONFIG_FILE_NAME};

pub const ROOT_ENV_VAR: &str = "CLISTRAP_ROOT";
pub const APP_DIR_NAME: &str = "clistrap";
pub const APP_SETTINGS_FILE_NAME: &str = "AppSettings.xml";
pub const REGISTRY_FILE_NAME: &str = "registry.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn versions_dir(&self, variant: Variant) -> PathBuf {
        self.root.join(variant.versions_folder())
    }

    pub fn version_dir(&self, variant: Variant, version: &VersionHash) -> PathBuf {
        self.versions_dir(variant).join(version.dir_name())
    }

    pub fn executable_path(&self, variant: Variant, version: &VersionHash) -> PathBuf {
        self.version_dir(variant, version)
            .join(variant.executable_name())
    }

    pub fn client_settings_path(&self, variant: Variant, version: &VersionHash) -> PathBuf {
        self.version_dir(variant, version)
            .join("ClientSettings")
            .join("ClientAppSettings.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn app_config_path(&self) -> PathBuf {
        self.root.join(APP_CONFIG_FILE_NAME)
    }

    pub fn policy_path(&self, variant: Variant) -> PathBuf {
        self.root.join(format!("{}-config.json", variant.as_str()))
    }

    pub fn fast_flags_path(&self, variant: Variant) -> PathBuf {
        self.root.join(format!("{}-fflags.json", variant.as_str()))
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE_NAME)
    }
}

/// `%LOCALAPPDATA%\clistrap` on Windows, `$HOME/.clistrap` elsewhere.
pub fn default_root() -> Result<PathBuf> {
    if let Some(root) = std::env::var_os(ROOT_ENV_VAR).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(root));
    }
    if cfg!(windows) {
        if let Some(local) = std::env::var_os("LOCALAPPDATA").filter(|value| !value.is_empty()) {
            return Ok(PathBuf::from(local).join(APP_DIR_NAME));
        }
    }
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("cannot determine a home directory; pass --root"))?;
    Ok(PathBuf::from(home).join(format!(".{APP_DIR_NAME}")))
}
