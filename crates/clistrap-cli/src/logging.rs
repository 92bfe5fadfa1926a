use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clistrap_core::Variant;
use tracing::{debug, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub(crate) const LOG_RETENTION: Duration = Duration::from_secs(3 * 24 * 60 * 60);

fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub(crate) fn log_file_path(logs_dir: &Path, variant: Option<Variant>, unix_secs: u64) -> PathBuf {
    let prefix = variant.map_or("clistrap", Variant::as_str);
    logs_dir.join(format!("{prefix}-{unix_secs}.log"))
}

/// Installs the global subscriber: stderr plus, when the logs directory is
/// writable, a plain-text file for this run. Returns the log file path.
pub(crate) fn init_logging(
    logs_dir: &Path,
    variant: Option<Variant>,
    verbose: bool,
) -> Option<PathBuf> {
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let unix_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    let path = log_file_path(logs_dir, variant, unix_secs);
    let file = fs::create_dir_all(logs_dir)
        .and_then(|()| File::create(&path))
        .ok();
    let file_layer = file.map(|file| {
        fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
    });
    let has_file = file_layer.is_some();

    let installed = tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    if installed.is_err() || !has_file {
        return None;
    }

    match prune_old_logs(logs_dir, SystemTime::now(), LOG_RETENTION) {
        Ok(removed) if removed > 0 => debug!(removed, "pruned old log files"),
        Ok(_) => {}
        Err(err) => warn!(error = %format!("{err:#}"), "failed to prune old log files"),
    }
    Some(path)
}

/// Deletes `*.log` files in `logs_dir` last modified more than `max_age`
/// before `now`. Returns how many were removed.
pub(crate) fn prune_old_logs(logs_dir: &Path, now: SystemTime, max_age: Duration) -> Result<usize> {
    let entries = match fs::read_dir(logs_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read logs dir: {}", logs_dir.display()));
        }
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("log") {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|metadata| metadata.modified())
            .with_context(|| format!("failed to stat {}", path.display()))?;
        let expired = now
            .duration_since(modified)
            .map(|age| age > max_age)
            .unwrap_or(false);
        if expired {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}
