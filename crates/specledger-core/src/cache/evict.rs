//! Cache eviction and cleanup.

use tokio::fs;
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};

use super::SnapshotCache;
use super::io::remove_dir_if_exists;

pub(crate) async fn evict_impl(
    cache: &SnapshotCache,
    url: &str,
    reference: &str,
) -> LedgerResult<()> {
    let entry_dir = cache.entry_dir(url, reference);

    if entry_dir.exists() {
        remove_dir_if_exists(&entry_dir)
            .await
            .map_err(|e| LedgerError::Cache {
                message: format!("failed to evict cache entry: {}", e),
            })?;
        debug!(url, reference, "evicted from cache");
    }

    Ok(())
}

pub(crate) async fn clear_impl(cache: &SnapshotCache) -> LedgerResult<()> {
    if cache.cache_dir.exists() {
        fs::remove_dir_all(&cache.cache_dir)
            .await
            .map_err(|e| LedgerError::Cache {
                message: format!("failed to clear cache: {}", e),
            })?;
        debug!(path = %cache.cache_dir.display(), "cleared snapshot cache");
    }
    Ok(())
}
