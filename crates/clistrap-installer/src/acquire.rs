use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

use anyhow::{anyhow, Context, Result};
use clistrap_core::{
    ChecksumAlgorithm, FolderMapping, ManifestEntry, MappedPath, PackageKind, Variant, VersionHash,
};
use clistrap_security::{checksum_matches, file_checksum_hex};
use tracing::{debug, error, info, warn};

use crate::artifact::extract_zip;
use crate::fs_utils::{remove_file_if_exists, validated_file_name, validated_relative_subpath};
use crate::layout::APP_SETTINGS_FILE_NAME;

pub const APP_SETTINGS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Settings>
    <ContentFolder>content</ContentFolder>
    <BaseUrl>http://www.roblox.com</BaseUrl>
</Settings>
"#;

/// Downloads one manifest file (by name) to the given path, returning bytes written.
pub type FetchFn<'a> = dyn Fn(&str, &Path) -> Result<u64> + Sync + 'a;
/// Unpacks an archive into a destination directory.
pub type ExtractFn<'a> = dyn Fn(&Path, &Path) -> Result<()> + 'a;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Archive unpacked into `subpath` (relative to the version directory)
    /// and removed afterwards. `unmapped` entries landed in the root.
    Extracted { subpath: String, unmapped: bool },
    /// Executable verified and kept in place.
    Placed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UnsupportedExtension,
    InvalidFileName(String),
    DownloadFailed(String),
    ChecksumMismatch { expected: String, actual: String },
    ExtractionFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedExtension => f.write_str("not an archive or executable"),
            Self::InvalidFileName(reason) => write!(f, "invalid file name: {reason}"),
            Self::DownloadFailed(reason) => write!(f, "download failed: {reason}"),
            Self::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum mismatch: expected {expected}, got {actual}")
            }
            Self::ExtractionFailed(reason) => write!(f, "extraction failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryReport {
    pub file_name: String,
    pub result: Result<EntryOutcome, SkipReason>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireReport {
    pub version: VersionHash,
    pub target_dir: PathBuf,
    pub entries: Vec<EntryReport>,
    pub bytes_downloaded: u64,
}

impl AcquireReport {
    pub fn completed(&self) -> impl Iterator<Item = &EntryReport> {
        self.entries.iter().filter(|entry| entry.result.is_ok())
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&str, &SkipReason)> {
        self.entries.iter().filter_map(|entry| match &entry.result {
            Err(reason) => Some((entry.file_name.as_str(), reason)),
            Ok(_) => None,
        })
    }

    pub fn unmapped(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|entry| match &entry.result {
            Ok(EntryOutcome::Extracted { unmapped: true, .. }) => Some(entry.file_name.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireOptions {
    pub checksum: ChecksumAlgorithm,
    pub download_concurrency: usize,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            checksum: ChecksumAlgorithm::Md5,
            download_concurrency: 4,
        }
    }
}

pub struct AcquireRequest<'a> {
    pub variant: Variant,
    pub version: &'a VersionHash,
    pub entries: &'a [ManifestEntry],
    pub mapping: &'a FolderMapping,
    pub target_dir: &'a Path,
}

/// Download, verify and extract pipeline for one version's manifest.
pub struct PackageAcquirer<'a> {
    fetch: &'a FetchFn<'a>,
    extract: &'a ExtractFn<'a>,
    options: AcquireOptions,
}

struct Work<'e> {
    index: usize,
    entry: &'e ManifestEntry,
    kind: PackageKind,
    path: PathBuf,
}

impl<'a> PackageAcquirer<'a> {
    pub fn new(fetch: &'a FetchFn<'a>, options: AcquireOptions) -> Self {
        Self {
            fetch,
            extract: &extract_zip,
            options,
        }
    }

    pub fn with_extractor(mut self, extract: &'a ExtractFn<'a>) -> Self {
        self.extract = extract;
        self
    }

    pub fn acquire(&self, request: &AcquireRequest<'_>) -> Result<AcquireReport> {
        let target_dir = request.target_dir;
        fs::create_dir_all(target_dir).with_context(|| {
            format!("failed to prepare version directory: {}", target_dir.display())
        })?;

        let mut results: Vec<Option<Result<EntryOutcome, SkipReason>>> =
            vec![None; request.entries.len()];
        let mut work = Vec::new();
        for (index, entry) in request.entries.iter().enumerate() {
            let Some(kind) = entry.package_kind() else {
                debug!(file = %entry.file_name, "skipping non-actionable manifest entry");
                results[index] = Some(Err(SkipReason::UnsupportedExtension));
                continue;
            };
            match validated_file_name(&entry.file_name) {
                Ok(name) => work.push(Work {
                    index,
                    entry,
                    kind,
                    path: target_dir.join(name),
                }),
                Err(err) => {
                    results[index] = Some(Err(SkipReason::InvalidFileName(err.to_string())))
                }
            }
        }
        let actionable = work.len()
            + results
                .iter()
                .filter(|r| matches!(r, Some(Err(SkipReason::InvalidFileName(_)))))
                .count();

        info!(version = %request.version, files = work.len(), "downloading packages");
        let downloads = run_bounded(&work, self.options.download_concurrency, |item| {
            debug!(file = %item.entry.file_name, "downloading");
            (self.fetch)(&item.entry.file_name, &item.path)
        });
        let mut bytes_downloaded = 0;
        let mut downloaded = Vec::new();
        for (item, outcome) in work.into_iter().zip(downloads) {
            match outcome {
                Ok(bytes) => {
                    bytes_downloaded += bytes;
                    downloaded.push(item);
                }
                Err(err) => {
                    error!(
                        file = %item.entry.file_name,
                        error = %format!("{err:#}"),
                        "download failed"
                    );
                    let _ = remove_file_if_exists(&item.path);
                    results[item.index] =
                        Some(Err(SkipReason::DownloadFailed(format!("{err:#}"))));
                }
            }
        }

        let algorithm = self.options.checksum;
        let checks = run_bounded(&downloaded, self.options.download_concurrency, |item| {
            file_checksum_hex(algorithm, &item.path)
        });
        let mut verified = Vec::new();
        for (item, check) in downloaded.into_iter().zip(checks) {
            let skip = match check {
                Ok(actual) if checksum_matches(&item.entry.checksum, &actual) => {
                    debug!(file = %item.entry.file_name, "checksum verified");
                    verified.push(item);
                    continue;
                }
                Ok(actual) => SkipReason::ChecksumMismatch {
                    expected: item.entry.checksum.clone(),
                    actual,
                },
                Err(err) => SkipReason::DownloadFailed(format!("{err:#}")),
            };
            warn!(file = %item.entry.file_name, reason = %skip, "discarding unverified file");
            if let Err(err) = remove_file_if_exists(&item.path) {
                error!(file = %item.path.display(), %err, "failed to delete unverified file");
            }
            results[item.index] = Some(Err(skip));
        }

        for item in verified {
            results[item.index] = Some(self.extract_entry(request, &item));
        }

        let entries: Vec<EntryReport> = request
            .entries
            .iter()
            .zip(results)
            .map(|(entry, result)| EntryReport {
                file_name: entry.file_name.clone(),
                result: result.unwrap_or(Err(SkipReason::UnsupportedExtension)),
            })
            .collect();
        let report = AcquireReport {
            version: request.version.clone(),
            target_dir: target_dir.to_path_buf(),
            entries,
            bytes_downloaded,
        };

        if actionable > 0 && report.completed().next().is_none() {
            let failures: Vec<String> = report
                .skipped()
                .filter(|(_, reason)| **reason != SkipReason::UnsupportedExtension)
                .map(|(file, reason)| format!("{file}: {reason}"))
                .collect();
            return Err(anyhow!(
                "every package of {} failed: {}",
                request.version,
                failures.join("; ")
            ));
        }

        let settings_path = target_dir.join(APP_SETTINGS_FILE_NAME);
        fs::write(&settings_path, APP_SETTINGS_XML)
            .with_context(|| format!("failed to write {}", settings_path.display()))?;

        info!(
            version = %request.version,
            completed = report.completed().count(),
            skipped = report
                .skipped()
                .filter(|(_, reason)| **reason != SkipReason::UnsupportedExtension)
                .count(),
            "package acquisition finished"
        );
        Ok(report)
    }

    fn extract_entry(
        &self,
        request: &AcquireRequest<'_>,
        item: &Work<'_>,
    ) -> Result<EntryOutcome, SkipReason> {
        if !item.kind.is_archive() {
            return Ok(EntryOutcome::Placed);
        }
        let file_name = item.entry.file_name.as_str();
        let (subpath, unmapped) = match request.mapping.resolve(request.variant, file_name) {
            MappedPath::Mapped(subpath) => (subpath.to_string(), false),
            MappedPath::Unmapped => {
                warn!(file = %file_name, "no folder mapping, extracting into version root");
                (String::new(), true)
            }
        };

        let outcome = validated_relative_subpath(&subpath).and_then(|relative| {
            let destination = request.target_dir.join(relative);
            debug!(file = %file_name, destination = %destination.display(), "extracting");
            (self.extract)(&item.path, &destination)
        });
        let cleanup = remove_file_if_exists(&item.path);
        match outcome {
            Ok(()) => {
                if let Err(err) = cleanup {
                    warn!(file = %item.path.display(), %err, "failed to delete extracted archive");
                }
                Ok(EntryOutcome::Extracted { subpath, unmapped })
            }
            Err(err) => {
                error!(file = %file_name, error = %format!("{err:#}"), "extraction failed");
                Err(SkipReason::ExtractionFailed(format!("{err:#}")))
            }
        }
    }
}

/// Runs `job` over `items` on at most `workers` scoped threads, keeping input order.
fn run_bounded<T, R, F>(items: &[T], workers: usize, job: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if items.is_empty() {
        return Vec::new();
    }
    let next = AtomicUsize::new(0);
    let slots: Mutex<Vec<Option<R>>> = Mutex::new(items.iter().map(|_| None).collect());
    thread::scope(|scope| {
        for _ in 0..workers.clamp(1, items.len()) {
            scope.spawn(|| loop {
                let index = next.fetch_add(1, Ordering::SeqCst);
                let Some(item) = items.get(index) else {
                    break;
                };
                let result = job(item);
                slots.lock().unwrap_or_else(PoisonError::into_inner)[index] = Some(result);
            });
        }
    });
    slots
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .into_iter()
        .flatten()
        .collect()
}
