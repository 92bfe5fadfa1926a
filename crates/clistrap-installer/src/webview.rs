use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Result;
use tracing::info;

use crate::artifact::{run_command, CommandRunner};

pub const WEBVIEW_SETUP_DIR: &str = "WebView2RuntimeInstaller";
pub const WEBVIEW_SETUP_EXE: &str = "MicrosoftEdgeWebview2Setup.exe";

/// Where the extracted `WebView2RuntimeInstaller.zip` puts the runtime setup.
pub fn webview_setup_path(version_dir: &Path) -> PathBuf {
    version_dir.join(WEBVIEW_SETUP_DIR).join(WEBVIEW_SETUP_EXE)
}

pub fn run_webview_setup(setup: &Path) -> Result<()> {
    run_webview_setup_with_runner(setup, &run_command)
}

/// Runs the runtime setup silently and waits for it to finish.
pub fn run_webview_setup_with_runner(setup: &Path, runner: CommandRunner<'_>) -> Result<()> {
    info!(setup = %setup.display(), "installing the WebView2 runtime");
    let mut command = Command::new(setup);
    command.arg("/silent").arg("/install");
    runner(&mut command, "WebView2 runtime setup failed")
}
