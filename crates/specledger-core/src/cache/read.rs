//! Cache read path.

use tokio::fs;
use tracing::{debug, warn};

use crate::digest::content_hash;
use crate::error::{LedgerError, LedgerResult};

use super::{CacheListing, CacheMeta, CachedSpec, SnapshotCache};
use super::io::read_metadata;
use super::keys::{METADATA_FILE, SNAPSHOT_DIR, STAGING_DIR};

pub(crate) async fn get_impl(
    cache: &SnapshotCache,
    url: &str,
    reference: &str,
    spec_path: &str,
) -> LedgerResult<Option<CachedSpec>> {
    let entry_dir = cache.entry_dir(url, reference);
    let snapshot_dir = entry_dir.join(SNAPSHOT_DIR);
    let meta_path = entry_dir.join(METADATA_FILE);

    if !snapshot_dir.is_dir() || !meta_path.exists() {
        debug!(url, reference, "snapshot not in cache");
        return Ok(None);
    }

    let metadata = read_metadata(&meta_path).await?;

    let Some(expected) = metadata.specs.get(spec_path).cloned() else {
        debug!(url, reference, spec_path, "spec not recorded for snapshot");
        return Ok(None);
    };

    let content = match fs::read(snapshot_dir.join(spec_path)).await {
        Ok(content) => content,
        Err(e) => {
            warn!(
                url,
                reference,
                spec_path,
                error = %e,
                "cached spec file is unreadable"
            );
            return Err(LedgerError::CacheCorrupt {
                url: url.to_string(),
                reference: reference.to_string(),
                expected,
                actual: "missing".to_string(),
            });
        }
    };

    let actual = content_hash(&content);
    if actual != expected {
        warn!(
            url,
            reference,
            spec_path,
            expected = %expected,
            actual = %actual,
            "cache integrity check failed"
        );
        return Err(LedgerError::CacheCorrupt {
            url: url.to_string(),
            reference: reference.to_string(),
            expected,
            actual,
        });
    }

    debug!(url, reference, spec_path, "cache hit");
    Ok(Some(CachedSpec {
        content,
        content_hash: actual,
        snapshot_dir,
        metadata,
    }))
}

pub(crate) async fn get_metadata_impl(
    cache: &SnapshotCache,
    url: &str,
    reference: &str,
) -> Option<CacheMeta> {
    let meta_path = cache.entry_dir(url, reference).join(METADATA_FILE);
    read_metadata(&meta_path).await.ok()
}

pub(crate) async fn list_impl(cache: &SnapshotCache) -> LedgerResult<Vec<CacheListing>> {
    let mut result = Vec::new();

    if !cache.cache_dir.exists() {
        return Ok(result);
    }

    let mut entries = fs::read_dir(&cache.cache_dir)
        .await
        .map_err(|e| LedgerError::Cache {
            message: format!("failed to read cache directory: {}", e),
        })?;

    while let Some(entry) = entries.next_entry().await.map_err(|e| LedgerError::Cache {
        message: format!("failed to read directory entry: {}", e),
    })? {
        let key = entry.file_name().to_string_lossy().to_string();
        if key == STAGING_DIR || !entry.path().is_dir() {
            continue;
        }

        match read_metadata(&entry.path().join(METADATA_FILE)).await {
            Ok(metadata) => result.push(CacheListing { key, metadata }),
            Err(e) => debug!(key = %key, error = %e, "skipping unreadable cache entry"),
        }
    }

    result.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(result)
}
