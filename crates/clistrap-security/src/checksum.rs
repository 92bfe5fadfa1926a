use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use clistrap_core::ChecksumAlgorithm;
use md5::Md5;
use sha2::{Digest, Sha256};

const READ_CHUNK: usize = 64 * 1024;

pub fn checksum_hex(algorithm: ChecksumAlgorithm, bytes: &[u8]) -> String {
    match algorithm {
        ChecksumAlgorithm::Md5 => hex::encode(Md5::digest(bytes)),
        ChecksumAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
    }
}

pub fn reader_checksum_hex<R: Read>(algorithm: ChecksumAlgorithm, reader: R) -> Result<String> {
    match algorithm {
        ChecksumAlgorithm::Md5 => digest_reader::<Md5, R>(reader),
        ChecksumAlgorithm::Sha256 => digest_reader::<Sha256, R>(reader),
    }
}

pub fn file_checksum_hex(algorithm: ChecksumAlgorithm, path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("failed to open file for checksum: {}", path.display()))?;
    reader_checksum_hex(algorithm, BufReader::new(file))
        .with_context(|| format!("failed to checksum {}", path.display()))
}

/// Hex digests compare case-insensitively; surrounding whitespace is ignored.
pub fn checksum_matches(expected_hex: &str, actual_hex: &str) -> bool {
    expected_hex.trim().eq_ignore_ascii_case(actual_hex.trim())
}

fn digest_reader<D: Digest, R: Read>(mut reader: R) -> Result<String> {
    let mut hasher = D::new();
    let mut buffer = vec![0_u8; READ_CHUNK];
    loop {
        let read = reader
            .read(&mut buffer)
            .context("failed reading input for checksum")?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
