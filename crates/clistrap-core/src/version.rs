use std::cmp::Ordering;
use std::fmt;

use anyhow::anyhow;

pub const VERSION_DIR_PREFIX: &str = "version-";

/// Opaque build hash as published by the deployment service.
///
/// Accepts both `abc123` and `version-abc123`; the stored form is the bare
/// hash, and [`VersionHash::upload_id`] renders the prefixed form used for
/// CDN URLs and install directory names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionHash(String);

impl VersionHash {
    pub fn parse(input: &str) -> anyhow::Result<Self> {
        let trimmed = input.trim();
        let hash = trimmed.strip_prefix(VERSION_DIR_PREFIX).unwrap_or(trimmed);
        if hash.is_empty() {
            return Err(anyhow!("version hash must not be empty"));
        }
        if !hash.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(anyhow!(
                "invalid version hash '{input}': expected ASCII letters and digits only"
            ));
        }
        Ok(Self(hash.to_string()))
    }

    /// Parses a directory name, returning `None` for anything that does not
    /// follow the `version-<hash>` convention.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        let hash = name.strip_prefix(VERSION_DIR_PREFIX)?;
        Self::parse(hash).ok()
    }

    pub fn hash(&self) -> &str {
        &self.0
    }

    pub fn upload_id(&self) -> String {
        format!("{VERSION_DIR_PREFIX}{}", self.0)
    }

    pub fn dir_name(&self) -> String {
        self.upload_id()
    }
}

impl fmt::Display for VersionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{VERSION_DIR_PREFIX}{}", self.0)
    }
}

/// Numeric, dot-segment-wise ordering of client version strings such as
/// `0.640.0.6400812`. Missing segments count as zero; non-numeric segments
/// compare as zero.
pub fn version_ordering(left: &str, right: &str) -> Ordering {
    let left_segments = numeric_segments(left);
    let right_segments = numeric_segments(right);
    let len = left_segments.len().max(right_segments.len());
    for index in 0..len {
        let l = left_segments.get(index).copied().unwrap_or(0);
        let r = right_segments.get(index).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Returns whichever argument is the newer version, or `None` when equal.
pub fn compare_versions<'a>(left: &'a str, right: &'a str) -> Option<&'a str> {
    match version_ordering(left, right) {
        Ordering::Greater => Some(left),
        Ordering::Less => Some(right),
        Ordering::Equal => None,
    }
}

fn numeric_segments(input: &str) -> Vec<u64> {
    input
        .trim()
        .split('.')
        .map(|segment| segment.trim().parse::<u64>().unwrap_or(0))
        .collect()
}
