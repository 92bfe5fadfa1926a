use anyhow::{anyhow, Context, Result};
use clistrap_core::{join_url, PackageManifest, VersionHash, MANIFEST_FILE_SUFFIX};
use tracing::info;

use crate::transport::Transport;

pub fn manifest_url(cdn_base: &str, version: &VersionHash) -> String {
    package_url(cdn_base, version, MANIFEST_FILE_SUFFIX)
}

pub fn package_url(cdn_base: &str, version: &VersionHash, file_name: &str) -> String {
    join_url(cdn_base, &format!("{}-{file_name}", version.upload_id()))
}

/// Fetches and parses the package manifest for `version`. Any failure here is
/// fatal for that version.
pub fn fetch_manifest(
    transport: &dyn Transport,
    cdn_base: &str,
    version: &VersionHash,
) -> Result<PackageManifest> {
    let url = manifest_url(cdn_base, version);
    let response = transport.get_text(&url)?;
    if !response.is_ok() {
        return Err(anyhow!(
            "manifest request failed with HTTP status {}: {url}",
            response.status
        ));
    }
    let manifest = PackageManifest::parse(&response.body)
        .with_context(|| format!("invalid package manifest for {version}"))?;
    info!(%version, entries = manifest.entries.len(), "fetched package manifest");
    Ok(manifest)
}
