//! Filesystem helpers for the snapshot cache.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{LedgerError, LedgerResult};

use super::{CacheMeta, SnapshotCache};
use super::keys::STAGING_DIR;

pub(crate) fn default_cache_dir_impl() -> LedgerResult<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| LedgerError::Cache {
        message: "could not determine home directory".to_string(),
    })?;

    Ok(home.join(".specledger").join("cache"))
}

pub(crate) async fn staging_path_impl(cache: &SnapshotCache) -> LedgerResult<PathBuf> {
    let staging_root = cache.cache_dir.join(STAGING_DIR);
    fs::create_dir_all(&staging_root)
        .await
        .map_err(|e| LedgerError::Cache {
            message: format!("failed to create staging directory: {}", e),
        })?;

    Ok(staging_root.join(uuid::Uuid::new_v4().simple().to_string()))
}

pub(crate) async fn read_metadata(path: &Path) -> LedgerResult<CacheMeta> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| LedgerError::Cache {
            message: format!("failed to read cache metadata: {}", e),
        })?;
    serde_json::from_str(&content).map_err(|e| LedgerError::Cache {
        message: format!("failed to parse cache metadata: {}", e),
    })
}

pub(crate) async fn write_metadata(path: &Path, metadata: &CacheMeta) -> LedgerResult<()> {
    let json = serde_json::to_string_pretty(metadata).map_err(|e| LedgerError::Cache {
        message: format!("failed to serialize metadata: {}", e),
    })?;

    crate::io::write_atomic(path, json.as_bytes())
        .await
        .map_err(|e| LedgerError::Cache {
            message: format!("failed to write cache metadata: {}", e),
        })
}

pub(crate) async fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
