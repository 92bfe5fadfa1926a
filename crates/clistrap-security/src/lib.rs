mod checksum;

pub use checksum::{checksum_hex, checksum_matches, file_checksum_hex, reader_checksum_hex};
