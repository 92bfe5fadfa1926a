use super::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use clistrap_core::{
    ChecksumAlgorithm, FolderMapping, ManifestEntry, RetentionPolicy, Variant, VersionHash,
};
use clistrap_security::checksum_hex;
use serde_json::{json, Value};

static TEST_LAYOUT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn build_test_layout_path(nanos: u128) -> PathBuf {
    let mut path = std::env::temp_dir();
    let sequence = TEST_LAYOUT_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.push(format!(
        "clistrap-installer-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    path
}

fn test_layout() -> InstallLayout {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    InstallLayout::new(build_test_layout_path(nanos))
}

fn entry(file_name: &str, payload: &[u8]) -> ManifestEntry {
    ManifestEntry {
        file_name: file_name.to_string(),
        checksum: checksum_hex(ChecksumAlgorithm::Md5, payload),
        compressed_size: payload.len() as u64,
        uncompressed_size: payload.len() as u64,
    }
}

fn hash(value: &str) -> VersionHash {
    VersionHash::parse(value).expect("valid version hash")
}

/// In-memory CDN: serves the given payloads by file name.
fn serve(files: &HashMap<String, Vec<u8>>) -> impl Fn(&str, &Path) -> Result<u64> + Sync + '_ {
    move |file_name: &str, out_path: &Path| {
        let payload = files
            .get(file_name)
            .ok_or_else(|| anyhow!("download failed with HTTP status 404: {file_name}"))?;
        fs::write(out_path, payload)?;
        Ok(payload.len() as u64)
    }
}

/// Records each extraction and drops a marker file into the destination.
struct RecordingExtractor {
    calls: Mutex<Vec<(String, PathBuf)>>,
    fail_on: Option<&'static str>,
}

impl RecordingExtractor {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: None,
        }
    }

    fn extract(&self, archive: &Path, destination: &Path) -> Result<()> {
        let name = archive
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        assert!(archive.exists(), "archive must be on disk when extracted");
        self.calls
            .lock()
            .expect("extractor lock")
            .push((name.clone(), destination.to_path_buf()));
        if self.fail_on == Some(name.as_str()) {
            return Err(anyhow!("corrupt archive"));
        }
        fs::create_dir_all(destination)?;
        fs::write(destination.join(format!("from-{name}")), b"ok")?;
        Ok(())
    }

    fn extracted(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("extractor lock")
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[test]
fn acquire_discards_file_with_checksum_mismatch() {
    let layout = test_layout();
    let version = hash("abc123");
    let target = layout.version_dir(Variant::Player, &version);

    let mut files = HashMap::new();
    files.insert("shaders.zip".to_string(), b"shader bytes".to_vec());
    files.insert("ssl.zip".to_string(), b"tampered bytes".to_vec());
    let entries = vec![
        entry("shaders.zip", b"shader bytes"),
        entry("ssl.zip", b"original bytes"),
    ];
    let fetch = serve(&files);
    let extractor = RecordingExtractor::new();
    let extract = |archive: &Path, destination: &Path| extractor.extract(archive, destination);
    let mapping = FolderMapping::builtin();

    let report = PackageAcquirer::new(&fetch, AcquireOptions::default())
        .with_extractor(&extract)
        .acquire(&AcquireRequest {
            variant: Variant::Player,
            version: &version,
            entries: &entries,
            mapping: &mapping,
            target_dir: &target,
        })
        .expect("acquisition must succeed with one good package");

    assert!(!target.join("ssl.zip").exists());
    assert!(!target.join("ssl.zip.part").exists());
    assert_eq!(extractor.extracted(), vec!["shaders.zip".to_string()]);
    assert!(target.join("shaders").join("from-shaders.zip").exists());
    assert!(!target.join("shaders.zip").exists(), "archive removed after extraction");
    assert!(target.join(APP_SETTINGS_FILE_NAME).exists());

    let skipped: Vec<(&str, &SkipReason)> = report.skipped().collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].0, "ssl.zip");
    assert!(matches!(
        skipped[0].1,
        SkipReason::ChecksumMismatch { expected, .. }
            if *expected == checksum_hex(ChecksumAlgorithm::Md5, b"original bytes")
    ));
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn acquire_keeps_executables_and_skips_unknown_entries() {
    let layout = test_layout();
    let version = hash("abc123");
    let target = layout.version_dir(Variant::Player, &version);

    let mut files = HashMap::new();
    files.insert("RobloxPlayerBeta.exe".to_string(), b"MZ".to_vec());
    let entries = vec![
        entry("RobloxPlayerBeta.exe", b"MZ"),
        entry("RobloxPlayerBeta.pdb", b"symbols"),
    ];
    let fetch = serve(&files);
    let extractor = RecordingExtractor::new();
    let extract = |archive: &Path, destination: &Path| extractor.extract(archive, destination);
    let mapping = FolderMapping::builtin();

    let report = PackageAcquirer::new(&fetch, AcquireOptions::default())
        .with_extractor(&extract)
        .acquire(&AcquireRequest {
            variant: Variant::Player,
            version: &version,
            entries: &entries,
            mapping: &mapping,
            target_dir: &target,
        })
        .expect("acquisition must succeed");

    assert!(target.join("RobloxPlayerBeta.exe").exists());
    assert!(extractor.extracted().is_empty());
    assert_eq!(report.entries[0].result, Ok(EntryOutcome::Placed));
    assert_eq!(
        report.entries[1].result,
        Err(SkipReason::UnsupportedExtension)
    );
    assert_eq!(report.bytes_downloaded, 2);
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn acquire_extracts_unmapped_archive_into_root() {
    let layout = test_layout();
    let version = hash("abc123");
    let target = layout.version_dir(Variant::Studio, &version);

    let mut files = HashMap::new();
    files.insert("brand-new.zip".to_string(), b"zip".to_vec());
    let entries = vec![entry("brand-new.zip", b"zip")];
    let fetch = serve(&files);
    let extractor = RecordingExtractor::new();
    let extract = |archive: &Path, destination: &Path| extractor.extract(archive, destination);
    let mapping = FolderMapping::builtin();

    let report = PackageAcquirer::new(&fetch, AcquireOptions::default())
        .with_extractor(&extract)
        .acquire(&AcquireRequest {
            variant: Variant::Studio,
            version: &version,
            entries: &entries,
            mapping: &mapping,
            target_dir: &target,
        })
        .expect("acquisition must succeed");

    assert_eq!(report.unmapped().collect::<Vec<_>>(), vec!["brand-new.zip"]);
    assert!(target.join("from-brand-new.zip").exists());
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn acquire_continues_after_download_and_extraction_failures() {
    let layout = test_layout();
    let version = hash("abc123");
    let target = layout.version_dir(Variant::Player, &version);

    let mut files = HashMap::new();
    files.insert("content-sky.zip".to_string(), b"sky".to_vec());
    files.insert("content-sounds.zip".to_string(), b"sounds".to_vec());
    let entries = vec![
        entry("content-fonts.zip", b"fonts"),
        entry("content-sky.zip", b"sky"),
        entry("content-sounds.zip", b"sounds"),
    ];
    let fetch = serve(&files);
    let mut extractor = RecordingExtractor::new();
    extractor.fail_on = Some("content-sounds.zip");
    let extract = |archive: &Path, destination: &Path| extractor.extract(archive, destination);
    let mapping = FolderMapping::builtin();

    let report = PackageAcquirer::new(
        &fetch,
        AcquireOptions {
            checksum: ChecksumAlgorithm::Md5,
            download_concurrency: 1,
        },
    )
    .with_extractor(&extract)
    .acquire(&AcquireRequest {
        variant: Variant::Player,
        version: &version,
        entries: &entries,
        mapping: &mapping,
        target_dir: &target,
    })
    .expect("one package still succeeds");

    assert!(matches!(
        report.entries[0].result,
        Err(SkipReason::DownloadFailed(_))
    ));
    assert_eq!(
        report.entries[1].result,
        Ok(EntryOutcome::Extracted {
            subpath: "content/sky/".to_string(),
            unmapped: false
        })
    );
    assert!(matches!(
        report.entries[2].result,
        Err(SkipReason::ExtractionFailed(_))
    ));
    assert!(!target.join("content-sounds.zip").exists());
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn acquire_fails_when_every_package_fails() {
    let layout = test_layout();
    let version = hash("abc123");
    let target = layout.version_dir(Variant::Player, &version);

    let files = HashMap::new();
    let entries = vec![entry("shaders.zip", b"a"), entry("ssl.zip", b"b")];
    let fetch = serve(&files);
    let mapping = FolderMapping::builtin();

    let err = PackageAcquirer::new(&fetch, AcquireOptions::default())
        .acquire(&AcquireRequest {
            variant: Variant::Player,
            version: &version,
            entries: &entries,
            mapping: &mapping,
            target_dir: &target,
        })
        .expect_err("all downloads failed");

    let message = err.to_string();
    assert!(message.contains("every package of version-abc123 failed"), "{message}");
    assert!(message.contains("shaders.zip") && message.contains("ssl.zip"), "{message}");
    assert!(!target.join(APP_SETTINGS_FILE_NAME).exists());
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn acquire_rejects_path_like_file_names() {
    let layout = test_layout();
    let version = hash("abc123");
    let target = layout.version_dir(Variant::Player, &version);

    let mut files = HashMap::new();
    files.insert("shaders.zip".to_string(), b"a".to_vec());
    let entries = vec![entry("../escape.zip", b"x"), entry("shaders.zip", b"a")];
    let fetch = serve(&files);
    let extractor = RecordingExtractor::new();
    let extract = |archive: &Path, destination: &Path| extractor.extract(archive, destination);
    let mapping = FolderMapping::builtin();

    let report = PackageAcquirer::new(&fetch, AcquireOptions::default())
        .with_extractor(&extract)
        .acquire(&AcquireRequest {
            variant: Variant::Player,
            version: &version,
            entries: &entries,
            mapping: &mapping,
            target_dir: &target,
        })
        .expect("valid package still succeeds");

    assert!(matches!(
        report.entries[0].result,
        Err(SkipReason::InvalidFileName(_))
    ));
    assert!(!layout.versions_dir(Variant::Player).join("escape.zip").exists());
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn retention_keeps_only_latest_version() {
    let layout = test_layout();
    let versions_dir = layout.versions_dir(Variant::Player);
    for name in ["version-AAA", "version-BBB", "version-CCC"] {
        fs::create_dir_all(versions_dir.join(name)).expect("must create version dir");
    }

    let report = apply_retention(&versions_dir, &hash("CCC"), &RetentionPolicy::default())
        .expect("retention must succeed");

    let remaining: Vec<String> = list_installed(&versions_dir)
        .expect("must list versions")
        .into_iter()
        .map(|installed| installed.hash.upload_id())
        .collect();
    assert_eq!(remaining, vec!["version-CCC".to_string()]);
    assert_eq!(report.removed, vec![hash("AAA"), hash("BBB")]);
    assert!(report.failed.is_empty());
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn retention_is_noop_when_keep_latest_disabled() {
    let layout = test_layout();
    let versions_dir = layout.versions_dir(Variant::Studio);
    for name in ["version-AAA", "version-BBB"] {
        fs::create_dir_all(versions_dir.join(name)).expect("must create version dir");
    }
    let policy = RetentionPolicy {
        only_keep_latest: false,
        ..RetentionPolicy::default()
    };

    let report = apply_retention(&versions_dir, &hash("BBB"), &policy).expect("retention");

    assert!(report.removed.is_empty());
    assert_eq!(list_installed(&versions_dir).expect("list").len(), 2);
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn list_installed_creates_missing_dir_and_ignores_foreign_entries() {
    let layout = test_layout();
    let versions_dir = layout.versions_dir(Variant::Player);

    assert!(list_installed(&versions_dir).expect("must list").is_empty());
    assert!(versions_dir.is_dir());

    fs::create_dir_all(versions_dir.join("version-1a2b")).expect("must create version dir");
    fs::create_dir_all(versions_dir.join("downloads")).expect("must create foreign dir");
    fs::write(versions_dir.join("version-file"), b"x").expect("must write stray file");

    let installed = list_installed(&versions_dir).expect("must list");
    assert_eq!(installed.len(), 1);
    assert_eq!(installed[0].hash, hash("1a2b"));
    assert_eq!(newest_installed(&installed).map(|v| &v.hash), Some(&hash("1a2b")));
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn prepare_install_covers_every_plan() {
    let layout = test_layout();
    let versions_dir = layout.versions_dir(Variant::Player);
    let version = hash("abc123");
    let version_dir = versions_dir.join("version-abc123");
    let policy = RetentionPolicy::default();

    assert_eq!(
        prepare_install(&versions_dir, &version, &policy, false).expect("fresh"),
        InstallPlan::Fresh
    );
    assert!(version_dir.is_dir());
    fs::write(version_dir.join("marker"), b"x").expect("must write marker");

    assert_eq!(
        prepare_install(&versions_dir, &version, &policy, false).expect("installed"),
        InstallPlan::AlreadyInstalled
    );
    assert_eq!(
        prepare_install(&versions_dir, &version, &policy, true).expect("overlay"),
        InstallPlan::Overlay
    );
    assert!(version_dir.join("marker").exists());

    let replace = RetentionPolicy {
        force_update: true,
        delete_existing_version: true,
        ..RetentionPolicy::default()
    };
    assert_eq!(
        prepare_install(&versions_dir, &version, &replace, false).expect("replace"),
        InstallPlan::Replace
    );
    assert!(version_dir.is_dir());
    assert!(!version_dir.join("marker").exists());
    assert!(InstallPlan::Replace.owns_directory());
    assert!(!InstallPlan::Overlay.owns_directory());
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn reconciled_json_fills_missing_and_preserves_unknown_keys() {
    let layout = test_layout();
    let path = layout.policy_path(Variant::Player);
    fs::create_dir_all(layout.root()).expect("must create root");
    fs::write(&path, r#"{"forceUpdate": true, "customNote": "keep me"}"#)
        .expect("must seed settings");

    let policy = load_policy(&path).expect("policy must load");
    assert!(policy.force_update);
    assert!(policy.only_keep_latest);

    let stored: Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
    assert_eq!(stored["customNote"], json!("keep me"));
    assert_eq!(stored["onlyKeepLatest"], json!(true));

    let again = load_reconciled_json(&path, &default_policy_document().expect("defaults"))
        .expect("second load");
    assert!(!again.rewritten);
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn reconciled_json_creates_missing_file_and_rejects_non_objects() {
    let layout = test_layout();
    let path = layout.fast_flags_path(Variant::Studio);

    let flags = load_fast_flags(&path).expect("flags must load");
    assert_eq!(flags, default_fast_flags());
    assert!(path.exists());

    fs::write(&path, "[1, 2]").expect("must write array");
    let err = load_fast_flags(&path).expect_err("array must be rejected");
    assert!(err.to_string().contains("must contain a JSON object"));
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn set_policy_value_parses_and_persists() {
    let layout = test_layout();
    let path = layout.policy_path(Variant::Player);

    let policy = set_policy_value(&path, "alwaysRunLatest", "TRUE").expect("must set bool");
    assert!(policy.always_run_latest);
    let policy = set_policy_value(&path, "preferredChannel", "zcanary").expect("must set text");
    assert_eq!(policy.preferred_channel, "zcanary");
    assert!(load_policy(&path).expect("reload").always_run_latest);

    let err = set_policy_value(&path, "onlyKeepLatest", "maybe").expect_err("bad bool");
    assert!(err.to_string().contains("expects true or false"));
    let err = set_policy_value(&path, "turbo", "true").expect_err("unknown key");
    assert!(err.to_string().contains("unknown setting 'turbo'"));
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn apply_fast_flags_writes_only_when_changed() {
    let layout = test_layout();
    let version = hash("abc123");
    let path = layout.client_settings_path(Variant::Player, &version);
    let flags = default_fast_flags();

    assert!(apply_fast_flags(&path, &flags).expect("first write"));
    assert!(!apply_fast_flags(&path, &flags).expect("unchanged"));

    let mut changed = flags.clone();
    changed.insert("FIntDebugForceMSAASamples".to_string(), json!(8));
    assert!(apply_fast_flags(&path, &changed).expect("changed write"));
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn extract_zip_falls_back_through_host_tools() {
    let layout = test_layout();
    let archive = layout.root().join("a.zip");
    let destination = layout.root().join("out");
    let programs = Mutex::new(Vec::new());
    let runner = |command: &mut Command, context: &str| -> Result<()> {
        let program = command.get_program().to_string_lossy().to_string();
        programs.lock().expect("lock").push(program.clone());
        if program == "tar" {
            return Ok(());
        }
        Err(anyhow!("{context}: not installed"))
    };

    extract_zip_with_runner(&archive, &destination, &runner).expect("tar fallback succeeds");

    let programs = programs.into_inner().expect("lock");
    assert_eq!(programs.last().map(String::as_str), Some("tar"));
    assert!(programs.contains(&"unzip".to_string()));
    assert!(destination.is_dir());
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn extract_zip_reports_every_failed_attempt() {
    let layout = test_layout();
    let archive = layout.root().join("a.zip");
    let runner =
        |_: &mut Command, context: &str| -> Result<()> { Err(anyhow!("{context}: boom")) };

    let err = extract_zip_with_runner(&archive, &layout.root().join("out"), &runner)
        .expect_err("all tools fail");

    let message = err.to_string();
    assert!(message.contains("unzip failed: boom"), "{message}");
    assert!(message.contains("tar failed: boom"), "{message}");
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn webview_setup_runs_silently_from_the_version_dir() {
    let version_dir = Path::new("versions").join("version-abc123");
    let setup = webview_setup_path(&version_dir);
    assert_eq!(
        setup,
        version_dir
            .join("WebView2RuntimeInstaller")
            .join("MicrosoftEdgeWebview2Setup.exe")
    );

    let invocations = Mutex::new(Vec::new());
    let runner = |command: &mut Command, _: &str| -> Result<()> {
        let args = command
            .get_args()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect::<Vec<_>>();
        invocations
            .lock()
            .expect("lock")
            .push((PathBuf::from(command.get_program()), args));
        Ok(())
    };
    run_webview_setup_with_runner(&setup, &runner).expect("setup succeeds");

    let invocations = invocations.into_inner().expect("lock");
    assert_eq!(
        invocations,
        vec![(setup, vec!["/silent".to_string(), "/install".to_string()])]
    );
}

#[test]
fn subpath_and_file_name_validation() {
    assert!(validated_relative_subpath("").is_ok());
    assert!(validated_relative_subpath("content/sky/").is_ok());
    assert!(validated_relative_subpath("../outside").is_err());
    assert!(validated_relative_subpath("/etc").is_err());
    assert_eq!(validated_file_name(" shaders.zip ").expect("plain"), "shaders.zip");
    assert!(validated_file_name("dir/shaders.zip").is_err());
    assert!(validated_file_name("dir\\shaders.zip").is_err());
    assert!(validated_file_name("..").is_err());
}

#[test]
fn layout_paths_follow_variant_conventions() {
    let layout = InstallLayout::new("/data/clistrap");
    let version = hash("abc");
    assert_eq!(
        layout.version_dir(Variant::Studio, &version),
        PathBuf::from("/data/clistrap/StudioVersions/version-abc")
    );
    assert_eq!(
        layout.executable_path(Variant::Player, &version),
        PathBuf::from("/data/clistrap/PlayerVersions/version-abc/RobloxPlayerBeta.exe")
    );
    assert_eq!(
        layout.policy_path(Variant::Player),
        PathBuf::from("/data/clistrap/player-config.json")
    );
    assert_eq!(
        layout.fast_flags_path(Variant::Studio),
        PathBuf::from("/data/clistrap/studio-fflags.json")
    );
}
