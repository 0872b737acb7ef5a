//! Cache key and path derivation.

use sha2::{Digest, Sha256};

pub(crate) const SNAPSHOT_DIR: &str = "snapshot";
pub(crate) const METADATA_FILE: &str = "metadata.json";
pub(crate) const STAGING_DIR: &str = ".staging";

const KEY_HASH_LEN: usize = 16;

/// Directory name for `(url, reference)`: a readable repository name plus a
/// short hash of the full pair, so distinct hosts never collide.
pub(crate) fn cache_key(url: &str, reference: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    hasher.update(reference.as_bytes());
    let hash = hex::encode(hasher.finalize());

    format!("{}-{}", repo_name(url), &hash[..KEY_HASH_LEN])
}

fn repo_name(url: &str) -> String {
    let last = url
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .rsplit(['/', ':'])
        .next()
        .unwrap_or_default();

    let name: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .take(48)
        .collect();

    if name.is_empty() {
        "repo".to_string()
    } else {
        name
    }
}
