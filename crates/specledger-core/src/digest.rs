//! Content fingerprinting.
//!
//! Every content hash in the manifest, lockfile and cache metadata is the
//! lowercase hex SHA-256 of the raw bytes, without any algorithm prefix.

use std::io::{Cursor, Read};

use sha2::{Digest, Sha256};

/// Length of a hex-encoded content hash.
pub const CONTENT_HASH_LEN: usize = 64;

pub(crate) fn sha256_hex_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute the content hash of in-memory bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    // In-memory hashing should be infallible; keep a single hashing implementation.
    sha256_hex_reader(Cursor::new(bytes)).expect("hashing in-memory bytes via cursor must not fail")
}

/// Whether a string has the shape of a content hash.
pub fn is_content_hash(value: &str) -> bool {
    value.len() == CONTENT_HASH_LEN && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
