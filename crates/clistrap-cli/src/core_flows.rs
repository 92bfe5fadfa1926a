use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, Context, Result};
use clistrap_core::{FolderMapping, Variant, VersionHash};
use clistrap_installer::{
    apply_fast_flags, apply_retention, discard_version_dir, list_installed, load_fast_flags,
    newest_installed, prepare_install, run_webview_setup_with_runner, webview_setup_path,
    AcquireReport, AcquireRequest, CommandRunner, InstallPlan, InstalledVersion,
    PackageAcquirer, RetentionReport,
};
use clistrap_registry::{
    association_tree, unregister, webview_runtime_installed, ConfigReconciler, MaintenanceReport,
    ReconcileReport, TemplateContext,
};
use clistrap_remote::{fetch_manifest, package_url, ChannelRelation, ResolvedVersion};
use tracing::{info, warn};

use crate::render::TerminalRenderer;
use crate::session::Session;

/// Which build an install should fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InstallTarget {
    /// The policy's preferred channel.
    Preferred,
    Channel(String),
    Version(VersionHash),
    Previous,
}

#[derive(Debug)]
pub(crate) struct InstallOutcome {
    pub(crate) version: VersionHash,
    pub(crate) plan: InstallPlan,
    pub(crate) report: Option<AcquireReport>,
    pub(crate) retention: Option<RetentionReport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LaunchChoice {
    InstallLatest,
    Installed(VersionHash),
}

/// Starts the client; injected so flows can run without a real executable.
pub(crate) type Spawner<'a> = &'a dyn Fn(&Path, &[String], &Path) -> Result<()>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WebViewStatus {
    /// The version ships no runtime setup.
    SetupMissing,
    AlreadyInstalled,
    Installed,
    SetupFailed(String),
}

#[derive(Debug)]
pub(crate) struct LaunchOutcome {
    pub(crate) version: VersionHash,
    pub(crate) installed: Option<InstallOutcome>,
    pub(crate) associations: ReconcileReport,
    pub(crate) flags_written: bool,
    pub(crate) webview: Option<WebViewStatus>,
    pub(crate) spawned: bool,
}

pub(crate) fn resolve_install_target(
    session: &Session,
    target: &InstallTarget,
) -> Result<VersionHash> {
    match target {
        InstallTarget::Version(version) => Ok(version.clone()),
        InstallTarget::Preferred => resolve_channel(session, &session.policy.preferred_channel)
            .map(|resolved| resolved.hash),
        InstallTarget::Channel(channel) => {
            resolve_channel(session, channel).map(|resolved| resolved.hash)
        }
        InstallTarget::Previous => session
            .resolver()?
            .resolve_previous(session.variant, session.cdn_base()?)?
            .ok_or_else(|| {
                anyhow!(
                    "deploy history lists no previous {} version",
                    session.variant
                )
            }),
    }
}

fn resolve_channel(session: &Session, channel: &str) -> Result<ResolvedVersion> {
    let resolved = session.resolver()?.resolve_latest(session.variant, channel)?;
    match &resolved.relation {
        ChannelRelation::Ahead { live } => {
            info!(channel = %resolved.channel, %live, "channel is ahead of live")
        }
        ChannelRelation::Behind { live } => {
            warn!(channel = %resolved.channel, %live, "channel is behind live")
        }
        _ => {}
    }
    Ok(resolved)
}

/// Prepares the version directory, downloads the manifest's packages and,
/// after a successful acquisition, applies the retention policy.
pub(crate) fn install_version(
    session: &Session,
    version: &VersionHash,
    force: bool,
    renderer: TerminalRenderer,
) -> Result<InstallOutcome> {
    let variant = session.variant;
    let versions_dir = session.layout.versions_dir(variant);
    let plan = prepare_install(&versions_dir, version, &session.policy, force)?;
    if !plan.needs_download() {
        return Ok(InstallOutcome {
            version: version.clone(),
            plan,
            report: None,
            retention: None,
        });
    }

    let result = acquire(session, version, renderer);
    let report = match result {
        Ok(report) => report,
        Err(err) => {
            if plan.owns_directory() {
                discard_version_dir(&versions_dir, version);
            }
            return Err(err);
        }
    };
    for (file_name, reason) in report.skipped() {
        warn!(file = file_name, %reason, "package skipped");
    }

    let retention = apply_retention(&versions_dir, version, &session.policy)?;
    Ok(InstallOutcome {
        version: version.clone(),
        plan,
        report: Some(report),
        retention: Some(retention),
    })
}

fn acquire(
    session: &Session,
    version: &VersionHash,
    renderer: TerminalRenderer,
) -> Result<AcquireReport> {
    let cdn_base = session.cdn_base()?;
    let manifest = fetch_manifest(session.transport.as_ref(), cdn_base, version)?;
    let total_bytes: u64 = manifest
        .actionable_entries()
        .map(|entry| entry.compressed_size)
        .sum();
    let progress = renderer.start_progress("download", total_bytes);
    let transport = session.transport.as_ref();

    let fetch = |file_name: &str, out_path: &Path| -> Result<u64> {
        let url = package_url(cdn_base, version, file_name);
        let reported = AtomicU64::new(0);
        transport.download(&url, out_path, &|written: u64, _total: Option<u64>| {
            let previous = reported.swap(written, Ordering::Relaxed);
            progress.advance(written.saturating_sub(previous));
        })
    };
    let mapping = FolderMapping::builtin();
    let target_dir = session.layout.version_dir(session.variant, version);
    let acquirer = PackageAcquirer::new(&fetch, session.acquire_options());

    match acquirer.acquire(&AcquireRequest {
        variant: session.variant,
        version,
        entries: &manifest.entries,
        mapping: &mapping,
        target_dir: &target_dir,
    }) {
        Ok(report) => {
            progress.finish_success(report.bytes_downloaded);
            Ok(report)
        }
        Err(err) => {
            progress.finish_abandon();
            Err(err)
        }
    }
}

/// Picks the version to launch from what is installed.
///
/// `select` is the 1-based position in [`list_installed`] order and is only
/// consulted when more than one version is installed. Without it, a launch
/// carrying pass-through arguments (a protocol URI) takes the newest
/// version; an interactive one must choose.
pub(crate) fn choose_launch_version(
    installed: &[InstalledVersion],
    always_run_latest: bool,
    select: Option<usize>,
    has_launch_args: bool,
) -> Result<LaunchChoice> {
    if installed.is_empty() || always_run_latest {
        return Ok(LaunchChoice::InstallLatest);
    }
    if let [only] = installed {
        return Ok(LaunchChoice::Installed(only.hash.clone()));
    }
    if select.is_none() && has_launch_args {
        if let Some(newest) = newest_installed(installed) {
            return Ok(LaunchChoice::Installed(newest.hash.clone()));
        }
    }
    let index = select.ok_or_else(|| {
        anyhow!(
            "{} versions are installed; choose one with --select 1..={}",
            installed.len(),
            installed.len()
        )
    })?;
    index
        .checked_sub(1)
        .and_then(|position| installed.get(position))
        .map(|chosen| LaunchChoice::Installed(chosen.hash.clone()))
        .ok_or_else(|| {
            anyhow!(
                "invalid version selection {index}: expected 1..={}",
                installed.len()
            )
        })
}

pub(crate) fn launch(
    session: &Session,
    select: Option<usize>,
    args: &[String],
    renderer: TerminalRenderer,
    spawn: Spawner<'_>,
    setup_runner: CommandRunner<'_>,
) -> Result<LaunchOutcome> {
    let variant = session.variant;
    let latest = resolve_channel(session, &session.policy.preferred_channel)?.hash;
    let installed = list_installed(&session.layout.versions_dir(variant))?;

    let choice = choose_launch_version(
        &installed,
        session.policy.always_run_latest,
        select,
        !args.is_empty(),
    )?;
    let needs_update = match &choice {
        LaunchChoice::InstallLatest => true,
        LaunchChoice::Installed(version) => version != &latest,
    };
    let installed_outcome = if needs_update {
        info!(%variant, version = %latest, "updating to latest version");
        Some(install_version(session, &latest, false, renderer)?)
    } else {
        None
    };

    let associations = register_version(session, &latest)?;
    let flags = load_fast_flags(&session.layout.fast_flags_path(variant))?;
    let flags_written = apply_fast_flags(
        &session.layout.client_settings_path(variant, &latest),
        &flags,
    )?;

    let executable = session.layout.executable_path(variant, &latest);
    let mut webview = None;
    let spawned = if executable.is_file() {
        if session.webview_setup {
            webview = Some(ensure_webview_runtime(session, &latest, setup_runner)?);
        }
        spawn(&executable, args, &session.layout.version_dir(variant, &latest))?;
        true
    } else {
        warn!(path = %executable.display(), "client executable is missing; not launching");
        false
    };

    Ok(LaunchOutcome {
        version: latest,
        installed: installed_outcome,
        associations,
        flags_written,
        webview,
        spawned,
    })
}

/// Installs the WebView2 runtime from the version's bundled setup unless the
/// store already lists it. A missing setup or a failing one is only a warning.
pub(crate) fn ensure_webview_runtime(
    session: &Session,
    version: &VersionHash,
    runner: CommandRunner<'_>,
) -> Result<WebViewStatus> {
    let setup = webview_setup_path(&session.layout.version_dir(session.variant, version));
    if !setup.is_file() {
        warn!(path = %setup.display(), "WebView2 runtime setup not found");
        return Ok(WebViewStatus::SetupMissing);
    }
    let store = session.open_store()?;
    if webview_runtime_installed(store.as_ref())? {
        return Ok(WebViewStatus::AlreadyInstalled);
    }
    match run_webview_setup_with_runner(&setup, runner) {
        Ok(()) => Ok(WebViewStatus::Installed),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "failed to install the WebView2 runtime");
            Ok(WebViewStatus::SetupFailed(format!("{err:#}")))
        }
    }
}

/// Reconciles protocol and file associations for the newest installed version.
pub(crate) fn register_newest(session: &Session) -> Result<(VersionHash, ReconcileReport)> {
    let variant = session.variant;
    let installed = list_installed(&session.layout.versions_dir(variant))?;
    let newest = newest_installed(&installed).ok_or_else(|| {
        anyhow!("no {variant} version is installed; run `clistrap install {variant}` first")
    })?;
    let report = register_version(session, &newest.hash)?;
    Ok((newest.hash.clone(), report))
}

pub(crate) fn register_version(
    session: &Session,
    version: &VersionHash,
) -> Result<ReconcileReport> {
    let variant = session.variant;
    let launcher = current_launcher()?;
    let version_dir = session.layout.version_dir(variant, version);
    let executable = session.layout.executable_path(variant, version);
    let tree = association_tree(&TemplateContext {
        variant,
        version,
        version_dir: &version_dir,
        executable: &executable,
        launcher: &launcher,
    })?;

    let mut store = session.open_store()?;
    let report = ConfigReconciler::new(store.as_mut()).reconcile(&tree)?;
    for failure in &report.failures {
        warn!(
            key = %failure.path,
            operation = failure.operation,
            error = %failure.error,
            "association not applied"
        );
    }
    Ok(report)
}

pub(crate) fn unregister_variant(session: &Session) -> Result<MaintenanceReport> {
    let mut store = session.open_store()?;
    unregister(store.as_mut(), session.variant)
}

fn current_launcher() -> Result<PathBuf> {
    std::env::current_exe().context("failed to locate the clistrap executable")
}

/// Starts `executable` without waiting for it.
pub(crate) fn spawn_detached(executable: &Path, args: &[String], working_dir: &Path) -> Result<()> {
    let child = Command::new(executable)
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to start {}", executable.display()))?;
    info!(pid = child.id(), path = %executable.display(), "client started");
    Ok(())
}

pub(crate) fn describe_variant(variant: Variant) -> &'static str {
    match variant {
        Variant::Player => "Roblox Player",
        Variant::Studio => "Roblox Studio",
    }
}
