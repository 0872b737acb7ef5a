//! Local snapshot cache for dependency repositories.
//!
//! Each `(repository URL, ref)` pair owns one snapshot of the shallow clone
//! plus the content hashes recorded when spec files were read from it. Reads
//! re-hash the spec file and refuse to serve a snapshot that drifted.
//!
//! # Cache Structure
//!
//! ```text
//! ~/.specledger/cache/
//!   {repo}-{key}/
//!     snapshot/        # Shallow clone
//!     metadata.json    # Commit and write-time content hashes
//!   .staging/{uuid}/   # In-progress clones, renamed into place
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerResult;

mod evict;
mod io;
mod keys;
mod put;
mod read;

pub(crate) use keys::cache_key;

/// Metadata stored alongside a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheMeta {
    /// Repository the snapshot was cloned from.
    pub repository_url: String,

    /// Ref the snapshot was cloned at.
    pub reference: String,

    /// Commit the ref resolved to.
    pub commit_hash: String,

    /// When the snapshot was fetched.
    pub fetched_at: DateTime<Utc>,

    /// Write-time content hash per spec path.
    #[serde(default)]
    pub specs: BTreeMap<String, String>,
}

/// A spec file served from the cache.
#[derive(Debug, Clone)]
pub struct CachedSpec {
    /// Raw spec bytes.
    pub content: Vec<u8>,

    /// Content hash, verified against the write-time hash.
    pub content_hash: String,

    /// Snapshot directory the spec was read from.
    pub snapshot_dir: PathBuf,

    /// Snapshot metadata.
    pub metadata: CacheMeta,
}

/// One entry returned by [`SnapshotCache::list`].
#[derive(Debug, Clone)]
pub struct CacheListing {
    /// Directory name of the entry.
    pub key: String,

    /// Entry metadata.
    pub metadata: CacheMeta,
}

/// Snapshot cache rooted at a directory.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    cache_dir: PathBuf,
}

impl SnapshotCache {
    /// Create a cache at the default location.
    ///
    /// Default: `~/.specledger/cache`
    pub fn new() -> LedgerResult<Self> {
        Ok(Self {
            cache_dir: io::default_cache_dir_impl()?,
        })
    }

    /// Create a cache with a custom directory.
    pub fn with_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Get the cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Directory holding the entry for a key.
    pub fn entry_dir(&self, url: &str, reference: &str) -> PathBuf {
        self.cache_dir.join(cache_key(url, reference))
    }

    /// Snapshot directory for a key.
    pub fn snapshot_dir(&self, url: &str, reference: &str) -> PathBuf {
        self.entry_dir(url, reference).join(keys::SNAPSHOT_DIR)
    }

    /// Get a cached spec file, verifying its content hash on read.
    ///
    /// Returns `None` if the key is not cached or the spec path was never
    /// recorded for it. Returns `Err(CacheCorrupt)` if the file changed or
    /// vanished since it was written; the caller should evict and re-fetch.
    pub async fn get(
        &self,
        url: &str,
        reference: &str,
        spec_path: &str,
    ) -> LedgerResult<Option<CachedSpec>> {
        read::get_impl(self, url, reference, spec_path).await
    }

    /// Get entry metadata without touching the snapshot.
    pub async fn get_metadata(&self, url: &str, reference: &str) -> Option<CacheMeta> {
        read::get_metadata_impl(self, url, reference).await
    }

    /// Allocate a fresh staging directory for a clone.
    ///
    /// The directory itself is not created so transports can clone into it.
    pub async fn staging_path(&self) -> LedgerResult<PathBuf> {
        io::staging_path_impl(self).await
    }

    /// Move a staged snapshot into place and record a spec's content hash.
    ///
    /// When the key already holds a snapshot at the same commit, the staged
    /// copy is discarded and only the hash is recorded.
    pub async fn put(
        &self,
        url: &str,
        reference: &str,
        staged: &Path,
        commit_hash: &str,
        spec_path: &str,
        content_hash: &str,
    ) -> LedgerResult<()> {
        put::put_impl(
            self,
            put::PutRequest {
                url,
                reference,
                staged,
                commit_hash,
                spec_path,
                content_hash,
            },
        )
        .await
    }

    /// Evict one entry.
    pub async fn evict(&self, url: &str, reference: &str) -> LedgerResult<()> {
        evict::evict_impl(self, url, reference).await
    }

    /// Remove every entry.
    pub async fn clear(&self) -> LedgerResult<()> {
        evict::clear_impl(self).await
    }

    /// List all entries with readable metadata, sorted by key.
    pub async fn list(&self) -> LedgerResult<Vec<CacheListing>> {
        read::list_impl(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::content_hash;
    use crate::error::LedgerError;
    use tempfile::TempDir;
    use tokio::fs;

    const URL: &str = "https://github.com/example/repo";

    fn create_test_cache() -> (SnapshotCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = SnapshotCache::with_dir(temp_dir.path().join("cache"));
        (cache, temp_dir)
    }

    async fn stage(cache: &SnapshotCache, files: &[(&str, &str)]) -> PathBuf {
        let staged = cache.staging_path().await.unwrap();
        for (path, content) in files {
            let file = staged.join(path);
            fs::create_dir_all(file.parent().unwrap()).await.unwrap();
            fs::write(&file, content).await.unwrap();
        }
        staged
    }

    #[tokio::test]
    async fn test_cache_roundtrip() {
        let (cache, _temp_dir) = create_test_cache();
        let content = "# Spec\n";
        let staged = stage(&cache, &[("spec.md", content)]).await;

        cache
            .put(URL, "main", &staged, "abc123", "spec.md", &content_hash(content.as_bytes()))
            .await
            .unwrap();
        assert!(!staged.exists(), "staging directory should be consumed");

        let hit = cache.get(URL, "main", "spec.md").await.unwrap().unwrap();
        assert_eq!(hit.content, content.as_bytes());
        assert_eq!(hit.content_hash, content_hash(content.as_bytes()));
        assert_eq!(hit.metadata.commit_hash, "abc123");
        assert_eq!(hit.snapshot_dir, cache.snapshot_dir(URL, "main"));
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let (cache, _temp_dir) = create_test_cache();
        assert!(cache.get(URL, "main", "spec.md").await.unwrap().is_none());
        assert!(cache.get_metadata(URL, "main").await.is_none());
    }

    #[tokio::test]
    async fn test_unrecorded_spec_path_is_a_miss() {
        let (cache, _temp_dir) = create_test_cache();
        let staged = stage(&cache, &[("spec.md", "a"), ("other.md", "b")]).await;
        cache
            .put(URL, "main", &staged, "abc123", "spec.md", &content_hash(b"a"))
            .await
            .unwrap();

        assert!(cache.get(URL, "main", "other.md").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_integrity_failure() {
        let (cache, _temp_dir) = create_test_cache();
        let staged = stage(&cache, &[("spec.md", "original")]).await;
        cache
            .put(URL, "main", &staged, "abc123", "spec.md", &content_hash(b"original"))
            .await
            .unwrap();

        fs::write(cache.snapshot_dir(URL, "main").join("spec.md"), "tampered")
            .await
            .unwrap();

        let result = cache.get(URL, "main", "spec.md").await;
        match result {
            Err(LedgerError::CacheCorrupt {
                expected, actual, ..
            }) => {
                assert_eq!(expected, content_hash(b"original"));
                assert_eq!(actual, content_hash(b"tampered"));
            }
            other => panic!("expected CacheCorrupt, got {:?}", other.map(|s| s.is_some())),
        }
    }

    #[tokio::test]
    async fn test_missing_recorded_file_is_corrupt() {
        let (cache, _temp_dir) = create_test_cache();
        let staged = stage(&cache, &[("spec.md", "x")]).await;
        cache
            .put(URL, "main", &staged, "abc123", "spec.md", &content_hash(b"x"))
            .await
            .unwrap();

        fs::remove_file(cache.snapshot_dir(URL, "main").join("spec.md"))
            .await
            .unwrap();

        assert!(matches!(
            cache.get(URL, "main", "spec.md").await,
            Err(LedgerError::CacheCorrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_second_spec_on_same_commit_reuses_snapshot() {
        let (cache, _temp_dir) = create_test_cache();
        let first = stage(&cache, &[("a.md", "a"), ("b.md", "b")]).await;
        cache
            .put(URL, "main", &first, "abc123", "a.md", &content_hash(b"a"))
            .await
            .unwrap();

        let second = stage(&cache, &[("a.md", "a"), ("b.md", "b")]).await;
        cache
            .put(URL, "main", &second, "abc123", "b.md", &content_hash(b"b"))
            .await
            .unwrap();
        assert!(!second.exists());

        let meta = cache.get_metadata(URL, "main").await.unwrap();
        assert_eq!(meta.specs.len(), 2);
        assert!(cache.get(URL, "main", "a.md").await.unwrap().is_some());
        assert!(cache.get(URL, "main", "b.md").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_new_commit_replaces_snapshot_and_hashes() {
        let (cache, _temp_dir) = create_test_cache();
        let first = stage(&cache, &[("a.md", "v1"), ("b.md", "b")]).await;
        cache
            .put(URL, "main", &first, "c1", "a.md", &content_hash(b"v1"))
            .await
            .unwrap();

        let second = stage(&cache, &[("a.md", "v2")]).await;
        cache
            .put(URL, "main", &second, "c2", "a.md", &content_hash(b"v2"))
            .await
            .unwrap();

        let meta = cache.get_metadata(URL, "main").await.unwrap();
        assert_eq!(meta.commit_hash, "c2");
        assert_eq!(meta.specs.len(), 1);
        let hit = cache.get(URL, "main", "a.md").await.unwrap().unwrap();
        assert_eq!(hit.content, b"v2");
    }

    #[tokio::test]
    async fn test_cache_evict_and_clear() {
        let (cache, _temp_dir) = create_test_cache();
        for reference in ["main", "v1.0.0"] {
            let staged = stage(&cache, &[("spec.md", reference)]).await;
            cache
                .put(URL, reference, &staged, "abc", "spec.md", &content_hash(reference.as_bytes()))
                .await
                .unwrap();
        }

        cache.evict(URL, "main").await.unwrap();
        assert!(cache.get(URL, "main", "spec.md").await.unwrap().is_none());
        assert!(cache.get(URL, "v1.0.0", "spec.md").await.unwrap().is_some());

        // Evicting an absent key is a no-op.
        cache.evict(URL, "main").await.unwrap();

        cache.clear().await.unwrap();
        assert!(cache.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cache_list_skips_staging() {
        let (cache, _temp_dir) = create_test_cache();
        let staged = stage(&cache, &[("spec.md", "x")]).await;
        cache
            .put(URL, "main", &staged, "abc", "spec.md", &content_hash(b"x"))
            .await
            .unwrap();
        let other = "https://github.com/example/zzz";
        let staged = stage(&cache, &[("spec.md", "y")]).await;
        cache
            .put(other, "main", &staged, "def", "spec.md", &content_hash(b"y"))
            .await
            .unwrap();

        // Left-over staging from an interrupted clone.
        let _abandoned = stage(&cache, &[("spec.md", "z")]).await;

        let list = cache.list().await.unwrap();
        assert_eq!(list.len(), 2);
        let urls: Vec<&str> = list
            .iter()
            .map(|l| l.metadata.repository_url.as_str())
            .collect();
        assert!(urls.contains(&URL));
        assert!(urls.contains(&other));
        assert!(list.windows(2).all(|w| w[0].key <= w[1].key));
    }
}
