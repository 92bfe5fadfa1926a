use anyhow::Result;
use clistrap_core::{RetentionPolicy, Variant, VersionHash};
use clistrap_installer::{
    list_installed, load_policy, newest_installed, run_command, set_policy_value, AcquireReport,
    InstallPlan, InstalledVersion,
};
use clistrap_registry::{MaintenanceReport, ReconcileReport};

use crate::completion::write_completions_script;
use crate::core_flows::{
    describe_variant, install_version, launch, register_newest, resolve_install_target,
    spawn_detached, unregister_variant, InstallOutcome, InstallTarget, WebViewStatus,
};
use crate::logging::init_logging;
use crate::render::TerminalRenderer;
use crate::session::{resolve_root, Session};
use crate::{Cli, Commands, InstallTargetArgs, SettingsAction};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        return write_completions_script(shell, &mut std::io::stdout());
    }

    let layout = resolve_root(cli.root)?;
    let variant = command_variant(&cli.command);
    init_logging(&layout.logs_dir(), variant, cli.verbose);
    let renderer = TerminalRenderer::current();

    match cli.command {
        Commands::Install {
            variant,
            target,
            force,
        } => {
            let session = Session::open(layout, variant.into())?;
            let target = install_target(&target)?;
            let version = resolve_install_target(&session, &target)?;
            renderer.print_section(&format!("install {}", session.variant));
            let outcome = install_version(&session, &version, force, renderer)?;
            renderer.print_lines(&format_install_outcome(&outcome));
        }
        Commands::Launch {
            variant,
            select,
            args,
        } => {
            let session = Session::open(layout, variant.into())?;
            let outcome = launch(
                &session,
                select,
                &args,
                renderer,
                &spawn_detached,
                &run_command,
            )?;
            if let Some(installed) = &outcome.installed {
                renderer.print_lines(&format_install_outcome(installed));
            }
            renderer.print_lines(&format_reconcile_report(&outcome.associations));
            if outcome.flags_written {
                renderer.print_status("ok", "client settings updated");
            }
            match &outcome.webview {
                Some(WebViewStatus::Installed) => {
                    renderer.print_status("ok", "WebView2 runtime installed")
                }
                Some(WebViewStatus::SetupFailed(error)) => renderer.print_status(
                    "warn",
                    &format!("WebView2 runtime setup failed: {error}"),
                ),
                _ => {}
            }
            if outcome.spawned {
                renderer.print_status(
                    "launched",
                    &format!("{} {}", describe_variant(session.variant), outcome.version),
                );
            } else {
                renderer.print_status("warn", "client executable is missing");
            }
        }
        Commands::List { variant } => {
            let variant: Variant = variant.into();
            let installed = list_installed(&layout.versions_dir(variant))?;
            renderer.print_lines(&format_installed_versions(variant, &installed));
        }
        Commands::Register { variant } => {
            let session = Session::open(layout, variant.into())?;
            let (version, report) = register_newest(&session)?;
            renderer.print_lines(&format_reconcile_report(&report));
            renderer.print_status("registered", &version.to_string());
        }
        Commands::Unregister { variant } => {
            let session = Session::open(layout, variant.into())?;
            let report = unregister_variant(&session)?;
            renderer.print_lines(&format_unregister_report(&report));
        }
        Commands::Settings { variant, action } => {
            let variant: Variant = variant.into();
            let policy_path = layout.policy_path(variant);
            let policy = match action {
                SettingsAction::Show => load_policy(&policy_path)?,
                SettingsAction::Set { key, value } => {
                    let policy = set_policy_value(&policy_path, &key, &value)?;
                    renderer.print_status("ok", &format!("{key} updated"));
                    policy
                }
            };
            renderer.print_lines(&format_policy(&policy));
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn command_variant(command: &Commands) -> Option<Variant> {
    match command {
        Commands::Install { variant, .. }
        | Commands::Launch { variant, .. }
        | Commands::List { variant }
        | Commands::Register { variant }
        | Commands::Unregister { variant }
        | Commands::Settings { variant, .. } => Some((*variant).into()),
        Commands::Completions { .. } => None,
    }
}

pub(crate) fn install_target(args: &InstallTargetArgs) -> Result<InstallTarget> {
    if let Some(version) = &args.version {
        return Ok(InstallTarget::Version(VersionHash::parse(version)?));
    }
    if args.previous {
        return Ok(InstallTarget::Previous);
    }
    Ok(match &args.channel {
        Some(channel) => InstallTarget::Channel(channel.clone()),
        None => InstallTarget::Preferred,
    })
}

pub(crate) fn format_install_outcome(outcome: &InstallOutcome) -> Vec<String> {
    let mut lines = Vec::new();
    match outcome.plan {
        InstallPlan::AlreadyInstalled => {
            lines.push(format!("{} is already installed", outcome.version));
            return lines;
        }
        InstallPlan::Fresh => lines.push(format!("installed {}", outcome.version)),
        InstallPlan::Overlay => lines.push(format!("reinstalled {} in place", outcome.version)),
        InstallPlan::Replace => lines.push(format!("replaced {}", outcome.version)),
    }
    if let Some(report) = &outcome.report {
        lines.extend(format_acquire_report(report));
    }
    if let Some(retention) = &outcome.retention {
        for removed in &retention.removed {
            lines.push(format!("removed old version {removed}"));
        }
        for (version, error) in &retention.failed {
            lines.push(format!("failed to remove {version}: {error}"));
        }
    }
    lines
}

fn format_acquire_report(report: &AcquireReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{} of {} packages ready",
        report.completed().count(),
        report.entries.len()
    )];
    for (file_name, reason) in report.skipped() {
        lines.push(format!("  skipped {file_name}: {reason}"));
    }
    for file_name in report.unmapped() {
        lines.push(format!("  unmapped {file_name}: extracted to the version root"));
    }
    lines
}

pub(crate) fn format_installed_versions(
    variant: Variant,
    installed: &[InstalledVersion],
) -> Vec<String> {
    if installed.is_empty() {
        return vec![format!("No {} versions installed", describe_variant(variant))];
    }
    let newest = newest_installed(installed).map(|version| &version.hash);
    installed
        .iter()
        .enumerate()
        .map(|(index, version)| {
            let marker = if Some(&version.hash) == newest {
                " (newest)"
            } else {
                ""
            };
            format!("{}. {}{marker}", index + 1, version.hash)
        })
        .collect()
}

pub(crate) fn format_reconcile_report(report: &ReconcileReport) -> Vec<String> {
    let mut lines = Vec::new();
    if report.is_noop() {
        lines.push("associations already up to date".to_string());
    } else {
        lines.push(format!(
            "associations: {} key(s) created, {} value(s) written",
            report.created_keys.len(),
            report.value_writes()
        ));
    }
    for failure in &report.failures {
        lines.push(format!(
            "  failed to {} {}: {}",
            failure.operation, failure.path, failure.error
        ));
    }
    lines
}

fn format_unregister_report(report: &MaintenanceReport) -> Vec<String> {
    let mut lines = vec![format!(
        "removed {} key(s) and {} value(s)",
        report.deleted_keys.len(),
        report.deleted_values.len()
    )];
    for failure in &report.failures {
        lines.push(format!(
            "  failed to {} {}: {}",
            failure.operation, failure.path, failure.error
        ));
    }
    lines
}

pub(crate) fn format_policy(policy: &RetentionPolicy) -> Vec<String> {
    vec![
        format!("deleteExistingVersion = {}", policy.delete_existing_version),
        format!("forceUpdate = {}", policy.force_update),
        format!("alwaysRunLatest = {}", policy.always_run_latest),
        format!("onlyKeepLatest = {}", policy.only_keep_latest),
        format!("preferredChannel = {}", policy.preferred_channel),
    ]
}
