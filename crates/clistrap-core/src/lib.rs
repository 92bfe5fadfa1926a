mod config;
mod endpoint;
mod manifest;
mod mapping;
mod package;
mod policy;
mod variant;
mod version;

pub use config::{AppConfig, ChecksumAlgorithm, MirrorStrategy, APP_CONFIG_FILE_NAME};
pub use endpoint::{
    default_cdn_mirrors, default_settings_mirrors, join_url, Endpoint, CDN_PROBE_EXPECTED_BODY,
    CDN_PROBE_PATH,
};
pub use manifest::{ManifestEntry, PackageManifest, MANIFEST_FILE_SUFFIX, MANIFEST_FORMAT_VERSION};
pub use mapping::{FolderMapping, MappedPath};
pub use package::PackageKind;
pub use policy::{is_production_channel, RetentionPolicy, DEFAULT_CHANNEL, PRODUCTION_CHANNEL_NAMES};
pub use variant::Variant;
pub use version::{compare_versions, version_ordering, VersionHash, VERSION_DIR_PREFIX};
