use anyhow::{anyhow, Context};

use crate::package::PackageKind;

pub const MANIFEST_FORMAT_VERSION: &str = "v0";
pub const MANIFEST_FILE_SUFFIX: &str = "rbxPkgManifest.txt";

const LINES_PER_ENTRY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub file_name: String,
    pub checksum: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl ManifestEntry {
    pub fn package_kind(&self) -> Option<PackageKind> {
        PackageKind::infer_from_file_name(&self.file_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManifest {
    pub entries: Vec<ManifestEntry>,
}

impl PackageManifest {
    /// Parses the flat-text package manifest.
    ///
    /// Line 0 must be the format tag `v0`. The remaining lines form records of
    /// four lines each (file name, checksum, compressed size, uncompressed
    /// size). Trailing whitespace and trailing blank lines are tolerated; an
    /// incomplete trailing record is ignored.
    pub fn parse(input: &str) -> anyhow::Result<Self> {
        let mut lines: Vec<&str> = input.lines().map(str::trim_end).collect();
        while lines.last().is_some_and(|line| line.trim().is_empty()) {
            lines.pop();
        }

        let Some(first) = lines.first() else {
            return Err(anyhow!("package manifest is empty"));
        };
        let tag = first.trim_start_matches('\u{feff}').trim();
        if tag != MANIFEST_FORMAT_VERSION {
            return Err(anyhow!(
                "unexpected package manifest version '{tag}'; expected '{MANIFEST_FORMAT_VERSION}'"
            ));
        }

        let mut entries = Vec::new();
        for (index, record) in lines[1..].chunks_exact(LINES_PER_ENTRY).enumerate() {
            let line_no = 2 + index * LINES_PER_ENTRY;
            let file_name = record[0].trim();
            if file_name.is_empty() {
                return Err(anyhow!("manifest line {line_no}: file name must not be empty"));
            }
            let checksum = record[1].trim();
            if checksum.is_empty() {
                return Err(anyhow!(
                    "manifest line {}: checksum for '{file_name}' must not be empty",
                    line_no + 1
                ));
            }
            let compressed_size = parse_size(record[2], line_no + 2, file_name)?;
            let uncompressed_size = parse_size(record[3], line_no + 3, file_name)?;
            entries.push(ManifestEntry {
                file_name: file_name.to_string(),
                checksum: checksum.to_ascii_lowercase(),
                compressed_size,
                uncompressed_size,
            });
        }

        Ok(Self { entries })
    }

    pub fn actionable_entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.package_kind().is_some())
    }
}

fn parse_size(raw: &str, line_no: usize, file_name: &str) -> anyhow::Result<u64> {
    raw.trim()
        .parse::<u64>()
        .with_context(|| format!("manifest line {line_no}: invalid size for '{file_name}': {raw}"))
}
