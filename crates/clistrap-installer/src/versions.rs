use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use clistrap_core::{RetentionPolicy, VersionHash};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion {
    pub hash: VersionHash,
    pub path: PathBuf,
    pub modified: Option<SystemTime>,
}

/// Installed versions under `versions_dir`, sorted by directory name.
/// The directory is created when missing.
pub fn list_installed(versions_dir: &Path) -> Result<Vec<InstalledVersion>> {
    fs::create_dir_all(versions_dir)
        .with_context(|| format!("failed to create {}", versions_dir.display()))?;
    let mut installed = Vec::new();
    for entry in fs::read_dir(versions_dir)
        .with_context(|| format!("failed to read {}", versions_dir.display()))?
    {
        let entry = entry.with_context(|| format!("failed to read {}", versions_dir.display()))?;
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }
        let Some(hash) = entry
            .file_name()
            .to_str()
            .and_then(VersionHash::from_dir_name)
        else {
            continue;
        };
        let modified = entry.metadata().ok().and_then(|meta| meta.modified().ok());
        installed.push(InstalledVersion {
            hash,
            path: entry.path(),
            modified,
        });
    }
    installed.sort_by(|left, right| left.hash.cmp(&right.hash));
    Ok(installed)
}

pub fn newest_installed(installed: &[InstalledVersion]) -> Option<&InstalledVersion> {
    installed.iter().max_by_key(|version| version.modified)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPlan {
    /// Directory present and not forced; nothing is downloaded.
    AlreadyInstalled,
    Fresh,
    /// Forced over an existing directory, overwritten file by file.
    Overlay,
    /// Forced with `deleteExistingVersion`; the old directory was removed.
    Replace,
}

impl InstallPlan {
    pub fn needs_download(self) -> bool {
        !matches!(self, Self::AlreadyInstalled)
    }

    /// Whether the version directory was created by this install and should be
    /// removed again when acquisition fails.
    pub fn owns_directory(self) -> bool {
        matches!(self, Self::Fresh | Self::Replace)
    }
}

pub fn prepare_install(
    versions_dir: &Path,
    version: &VersionHash,
    policy: &RetentionPolicy,
    force: bool,
) -> Result<InstallPlan> {
    let version_dir = versions_dir.join(version.dir_name());
    let forced = force || policy.force_update;
    let plan = if !version_dir.exists() {
        InstallPlan::Fresh
    } else if !forced {
        InstallPlan::AlreadyInstalled
    } else if policy.delete_existing_version {
        fs::remove_dir_all(&version_dir).with_context(|| {
            format!("failed to delete existing version: {}", version_dir.display())
        })?;
        InstallPlan::Replace
    } else {
        InstallPlan::Overlay
    };
    if plan.needs_download() {
        fs::create_dir_all(&version_dir)
            .with_context(|| format!("failed to create {}", version_dir.display()))?;
    }
    info!(%version, ?plan, "prepared install");
    Ok(plan)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub removed: Vec<VersionHash>,
    pub failed: Vec<(VersionHash, String)>,
}

/// With `onlyKeepLatest`, deletes every installed version except `keep`.
/// Only meant to run after a successful update.
pub fn apply_retention(
    versions_dir: &Path,
    keep: &VersionHash,
    policy: &RetentionPolicy,
) -> Result<RetentionReport> {
    let mut report = RetentionReport::default();
    if !policy.only_keep_latest {
        return Ok(report);
    }
    for installed in list_installed(versions_dir)? {
        if &installed.hash == keep {
            continue;
        }
        match fs::remove_dir_all(&installed.path) {
            Ok(()) => {
                info!(version = %installed.hash, "removed old version");
                report.removed.push(installed.hash);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(version = %installed.hash, %err, "failed to remove old version");
                report.failed.push((installed.hash, err.to_string()));
            }
        }
    }
    Ok(report)
}

/// Removes a directory created by a failed install attempt.
pub fn discard_version_dir(versions_dir: &Path, version: &VersionHash) {
    let version_dir = versions_dir.join(version.dir_name());
    if let Err(err) = fs::remove_dir_all(&version_dir) {
        if err.kind() != io::ErrorKind::NotFound {
            warn!(dir = %version_dir.display(), %err, "failed to clean up incomplete version");
        }
    }
}
