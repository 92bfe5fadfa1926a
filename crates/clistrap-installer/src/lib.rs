mod acquire;
mod artifact;
mod fs_utils;
mod layout;
mod settings;
mod versions;
mod webview;

pub use acquire::{
    AcquireOptions, AcquireReport, AcquireRequest, EntryOutcome, EntryReport, ExtractFn, FetchFn,
    PackageAcquirer, SkipReason, APP_SETTINGS_XML,
};
pub use artifact::{extract_zip, extract_zip_with_runner, run_command, CommandRunner};
pub use fs_utils::{remove_file_if_exists, validated_file_name, validated_relative_subpath};
pub use layout::{
    default_root, InstallLayout, APP_DIR_NAME, APP_SETTINGS_FILE_NAME, REGISTRY_FILE_NAME,
    ROOT_ENV_VAR,
};
pub use settings::{
    apply_fast_flags, default_fast_flags, default_policy_document, load_fast_flags, load_policy,
    load_reconciled_json, set_policy_value, write_pretty_json, ReconciledJson,
};
pub use versions::{
    apply_retention, discard_version_dir, list_installed, newest_installed, prepare_install,
    InstallPlan, InstalledVersion, RetentionReport,
};
pub use webview::{
    run_webview_setup, run_webview_setup_with_runner, webview_setup_path, WEBVIEW_SETUP_DIR,
    WEBVIEW_SETUP_EXE,
};

#[cfg(test)]
mod tests;
