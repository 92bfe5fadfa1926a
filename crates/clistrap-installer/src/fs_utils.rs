use std::fs;
use std::io;
use std::path::{Component, Path};

use anyhow::{anyhow, Result};

pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Folder-mapping subpaths are relative to the version directory. An empty
/// subpath means the version directory itself.
pub fn validated_relative_subpath(subpath: &str) -> Result<&Path> {
    let relative = Path::new(subpath);
    if relative.is_absolute() || relative.has_root() {
        return Err(anyhow!("extraction subpath must be relative: {subpath}"));
    }
    if relative
        .components()
        .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(anyhow!("extraction subpath must not include '..': {subpath}"));
    }
    Ok(relative)
}

/// Manifest file names are placed directly in the version directory.
pub fn validated_file_name(file_name: &str) -> Result<&str> {
    let trimmed = file_name.trim();
    let mut components = Path::new(trimmed).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !trimmed.contains(['/', '\\']) => Ok(trimmed),
        _ => Err(anyhow!("manifest file name must be a plain file name: {file_name}")),
    }
}
