use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use tracing::debug;

/// Executes a prepared command; `context_message` prefixes any failure.
pub type CommandRunner<'a> = &'a dyn Fn(&mut Command, &str) -> Result<()>;

pub fn extract_zip(archive_path: &Path, dst: &Path) -> Result<()> {
    extract_zip_with_runner(archive_path, dst, &run_command)
}

/// Unpacks a zip with the host tools: PowerShell `Expand-Archive` on Windows,
/// then `unzip`, then `tar`. Every attempt's failure is reported if none works.
pub fn extract_zip_with_runner(
    archive_path: &Path,
    dst: &Path,
    runner: CommandRunner<'_>,
) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;
    let mut attempts = Vec::new();

    if cfg!(windows) {
        let mut command = Command::new("powershell");
        command.arg("-NoProfile").arg("-Command").arg(format!(
            "Expand-Archive -LiteralPath '{}' -DestinationPath '{}' -Force",
            escape_ps_single_quote(archive_path),
            escape_ps_single_quote(dst)
        ));
        match runner(&mut command, "powershell Expand-Archive failed") {
            Ok(()) => return Ok(()),
            Err(err) => attempts.push(format!("{err:#}")),
        }
    }

    let mut unzip_command = Command::new("unzip");
    unzip_command
        .arg("-q")
        .arg("-o")
        .arg(archive_path)
        .arg("-d")
        .arg(dst);
    match runner(&mut unzip_command, "unzip failed") {
        Ok(()) => return Ok(()),
        Err(err) => {
            debug!(
                archive = %archive_path.display(),
                error = %format!("{err:#}"),
                "unzip unavailable, falling back to tar"
            );
            attempts.push(format!("{err:#}"));
        }
    }

    let mut tar_command = Command::new("tar");
    tar_command
        .arg("-xf")
        .arg(archive_path)
        .arg("-C")
        .arg(dst);
    match runner(&mut tar_command, "tar failed") {
        Ok(()) => Ok(()),
        Err(err) => {
            attempts.push(format!("{err:#}"));
            Err(anyhow!(
                "failed to extract {}: {}",
                archive_path.display(),
                attempts.join("; ")
            ))
        }
    }
}

pub fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    let output = command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    ))
}

fn escape_ps_single_quote(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "''")
}
