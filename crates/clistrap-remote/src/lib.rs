mod manifest_fetch;
mod mirror;
mod resolve;
mod transport;

pub use manifest_fetch::{fetch_manifest, manifest_url, package_url};
pub use mirror::{run_probe, MirrorSelection, MirrorSelector, Probe, ProbeOutcome, RaceTiming};
pub use resolve::{
    client_version_url, previous_version_from_history, settings_probe, ChannelRelation,
    ResolvedVersion, VersionResolver, DEPLOY_HISTORY_PATH,
};
pub use transport::{
    finalize_part_file, part_path_for, HttpResponse, ProgressFn, ReqwestTransport, Transport,
};

use clistrap_core::{CDN_PROBE_EXPECTED_BODY, CDN_PROBE_PATH};

/// Liveness probe for CDN mirrors: a known studio build hash.
pub fn cdn_probe() -> Probe {
    Probe::new(CDN_PROBE_PATH).expecting(CDN_PROBE_EXPECTED_BODY)
}
