use std::cmp::Ordering;

use anyhow::{anyhow, Context, Result};
use clistrap_core::{
    is_production_channel, join_url, version_ordering, Variant, VersionHash, DEFAULT_CHANNEL,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::mirror::Probe;
use crate::transport::Transport;

pub const DEPLOY_HISTORY_PATH: &str = "DeployHistory.txt";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientVersionResponse {
    client_version_upload: Option<String>,
    version: Option<String>,
}

/// How a non-production channel relates to the live channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRelation {
    Production,
    Ahead { live: String },
    Behind { live: String },
    SameAsLive,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    pub hash: VersionHash,
    pub client_version: Option<String>,
    pub channel: String,
    pub relation: ChannelRelation,
}

pub struct VersionResolver<'a> {
    transport: &'a dyn Transport,
    settings_base: String,
}

impl<'a> VersionResolver<'a> {
    pub fn new(transport: &'a dyn Transport, settings_base: &str) -> Self {
        Self {
            transport,
            settings_base: settings_base.to_string(),
        }
    }

    /// Asks the settings service which build `channel` currently points at.
    ///
    /// Non-production channels are also compared against live; that
    /// comparison is informational and a failure there only yields
    /// [`ChannelRelation::Unknown`].
    pub fn resolve_latest(&self, variant: Variant, channel: &str) -> Result<ResolvedVersion> {
        let channel = validate_channel(channel)?;
        let (hash, client_version) = self.fetch_channel(variant, &channel)?;

        let relation = if is_production_channel(&channel) {
            ChannelRelation::Production
        } else {
            self.relation_to_live(variant, client_version.as_deref())
        };
        info!(%variant, %channel, version = %hash, ?relation, "resolved version");

        Ok(ResolvedVersion {
            hash,
            client_version,
            channel,
            relation,
        })
    }

    /// Second most recent deployment of `variant` recorded in the deploy
    /// history served by `cdn_base`, or `None` when the history holds fewer
    /// than two.
    pub fn resolve_previous(
        &self,
        variant: Variant,
        cdn_base: &str,
    ) -> Result<Option<VersionHash>> {
        let url = join_url(cdn_base, DEPLOY_HISTORY_PATH);
        let response = self.transport.get_text(&url)?;
        if !response.is_ok() {
            return Err(anyhow!(
                "deploy history request failed with HTTP status {}: {url}",
                response.status
            ));
        }
        let previous = previous_version_from_history(&response.body, variant.deploy_type());
        match &previous {
            Some(hash) => info!(%variant, version = %hash, "resolved previous version"),
            None => warn!(%variant, "deploy history lists fewer than two deployments"),
        }
        Ok(previous)
    }

    fn fetch_channel(
        &self,
        variant: Variant,
        channel: &str,
    ) -> Result<(VersionHash, Option<String>)> {
        let url = client_version_url(&self.settings_base, variant, channel);
        debug!(%url, "querying client version");
        let response = self.transport.get_text(&url)?;
        if !response.is_ok() {
            return Err(anyhow!(
                "channel '{channel}' could not be resolved for {variant}: HTTP status {}",
                response.status
            ));
        }
        let payload: ClientVersionResponse = serde_json::from_str(&response.body)
            .with_context(|| format!("invalid client version response from {url}"))?;
        let upload = payload
            .client_version_upload
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                anyhow!("client version response from {url} is missing 'clientVersionUpload'")
            })?;
        let hash = VersionHash::parse(&upload)
            .with_context(|| format!("invalid clientVersionUpload in response from {url}"))?;
        Ok((hash, payload.version))
    }

    fn relation_to_live(&self, variant: Variant, channel_version: Option<&str>) -> ChannelRelation {
        let live_version = match self.fetch_channel(variant, DEFAULT_CHANNEL) {
            Ok((_, version)) => version,
            Err(err) => {
                warn!(
                    %variant,
                    error = %format!("{err:#}"),
                    "failed to resolve live version for comparison"
                );
                return ChannelRelation::Unknown;
            }
        };
        let (Some(channel_version), Some(live)) = (channel_version, live_version) else {
            return ChannelRelation::Unknown;
        };
        match version_ordering(channel_version, &live) {
            Ordering::Greater => ChannelRelation::Ahead { live },
            Ordering::Less => ChannelRelation::Behind { live },
            Ordering::Equal => ChannelRelation::SameAsLive,
        }
    }
}

pub fn client_version_url(settings_base: &str, variant: Variant, channel: &str) -> String {
    join_url(
        settings_base,
        &format!(
            "v2/client-version/{}/channel/{channel}",
            variant.binary_type()
        ),
    )
}

/// Liveness probe for settings mirrors: the live client-version endpoint,
/// any 200 accepted.
pub fn settings_probe(variant: Variant) -> Probe {
    Probe::new(format!(
        "/v2/client-version/{}/channel/{DEFAULT_CHANNEL}",
        variant.binary_type()
    ))
}

/// Scans the deploy history from the end for `New {deploy_type} version-<hash>`
/// lines and returns the hash of the second match.
pub fn previous_version_from_history(history: &str, deploy_type: &str) -> Option<VersionHash> {
    let marker = format!("New {deploy_type} version-");
    history
        .lines()
        .rev()
        .filter_map(|line| {
            let rest = line.trim_start().strip_prefix(&marker)?;
            let hash: String = rest
                .chars()
                .take_while(|ch| ch.is_ascii_alphanumeric())
                .collect();
            VersionHash::parse(&hash).ok()
        })
        .nth(1)
}

fn validate_channel(channel: &str) -> Result<String> {
    let trimmed = channel.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("channel name must not be empty"));
    }
    if !trimmed
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(anyhow!(
            "invalid channel name '{channel}': expected letters, digits, '-' or '_'"
        ));
    }
    Ok(trimmed.to_ascii_lowercase())
}
