use std::cell::OnceCell;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clistrap_core::{AppConfig, Endpoint, RetentionPolicy, Variant};
use clistrap_installer::{default_root, load_policy, AcquireOptions, InstallLayout};
use clistrap_registry::{ConfigStore, FileStore, RegCommandStore};
use clistrap_remote::{
    cdn_probe, settings_probe, MirrorSelector, Probe, RaceTiming, ReqwestTransport, Transport,
    VersionResolver,
};
use tracing::info;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum StoreKind {
    /// `reg.exe` on Windows, the JSON file store elsewhere.
    Native,
    File,
}

/// Everything one invocation works with: loaded once, passed to every flow.
pub(crate) struct Session {
    pub(crate) layout: InstallLayout,
    pub(crate) variant: Variant,
    pub(crate) config: AppConfig,
    pub(crate) policy: RetentionPolicy,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) store_kind: StoreKind,
    /// Whether launches install the WebView2 runtime when it is missing.
    pub(crate) webview_setup: bool,
    cdn_base: OnceCell<String>,
    settings_base: OnceCell<String>,
}

pub(crate) fn resolve_root(root: Option<PathBuf>) -> Result<InstallLayout> {
    let root = match root {
        Some(root) => root,
        None => default_root()?,
    };
    Ok(InstallLayout::new(root))
}

impl Session {
    pub(crate) fn open(layout: InstallLayout, variant: Variant) -> Result<Self> {
        let config = AppConfig::load(&layout.app_config_path())?;
        let transport = ReqwestTransport::new(config.probe_timeout(), config.download_timeout())?;
        Self::with_transport(layout, variant, config, Arc::new(transport))
    }

    pub(crate) fn with_transport(
        layout: InstallLayout,
        variant: Variant,
        config: AppConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let policy = load_policy(&layout.policy_path(variant))?;
        Ok(Self {
            layout,
            variant,
            config,
            policy,
            transport,
            store_kind: StoreKind::Native,
            webview_setup: cfg!(windows),
            cdn_base: OnceCell::new(),
            settings_base: OnceCell::new(),
        })
    }

    pub(crate) fn acquire_options(&self) -> AcquireOptions {
        AcquireOptions {
            checksum: self.config.checksum_algorithm,
            download_concurrency: self.config.download_concurrency,
        }
    }

    /// Fastest CDN mirror, selected on first use.
    pub(crate) fn cdn_base(&self) -> Result<&str> {
        self.cached_mirror(&self.cdn_base, &self.config.cdn_mirrors, &cdn_probe(), "CDN")
    }

    pub(crate) fn settings_base(&self) -> Result<&str> {
        self.cached_mirror(
            &self.settings_base,
            &self.config.settings_mirrors,
            &settings_probe(self.variant),
            "settings",
        )
    }

    pub(crate) fn resolver(&self) -> Result<VersionResolver<'_>> {
        Ok(VersionResolver::new(
            self.transport.as_ref(),
            self.settings_base()?,
        ))
    }

    pub(crate) fn open_store(&self) -> Result<Box<dyn ConfigStore>> {
        if self.store_kind == StoreKind::Native && cfg!(windows) {
            return Ok(Box::new(RegCommandStore::new()));
        }
        Ok(Box::new(FileStore::open(&self.layout.registry_path())?))
    }

    fn cached_mirror<'s>(
        &'s self,
        cell: &'s OnceCell<String>,
        endpoints: &[Endpoint],
        probe: &Probe,
        label: &str,
    ) -> Result<&'s str> {
        if let Some(base_url) = cell.get() {
            return Ok(base_url.as_str());
        }
        let selector = MirrorSelector::new(
            Arc::clone(&self.transport),
            RaceTiming {
                stagger_unit: self.config.stagger_unit(),
                probe_timeout: self.config.probe_timeout(),
            },
        );
        let selection = selector
            .select_fastest(endpoints, probe, self.config.mirror_strategy)
            .with_context(|| format!("failed to select a {label} mirror"))?;
        info!(
            mirror = %selection.base_url,
            latency_ms = selection.latency.as_millis() as u64,
            "selected {label} mirror"
        );
        let _ = cell.set(selection.base_url);
        cell.get()
            .map(String::as_str)
            .ok_or_else(|| anyhow!("{label} mirror selection was not recorded"))
    }
}
