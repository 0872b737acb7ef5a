//! Cache write path.
//!
//! Callers serialize writers per key; this module only guarantees that a
//! reader never observes a half-moved snapshot or half-written metadata.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use tokio::fs;
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};

use super::{CacheMeta, SnapshotCache};
use super::io::{read_metadata, remove_dir_if_exists, write_metadata};
use super::keys::{METADATA_FILE, SNAPSHOT_DIR};

pub(crate) struct PutRequest<'a> {
    pub url: &'a str,
    pub reference: &'a str,
    pub staged: &'a Path,
    pub commit_hash: &'a str,
    pub spec_path: &'a str,
    pub content_hash: &'a str,
}

pub(crate) async fn put_impl(cache: &SnapshotCache, req: PutRequest<'_>) -> LedgerResult<()> {
    let entry_dir = cache.entry_dir(req.url, req.reference);
    let snapshot_dir = entry_dir.join(SNAPSHOT_DIR);
    let meta_path = entry_dir.join(METADATA_FILE);

    fs::create_dir_all(&entry_dir)
        .await
        .map_err(|e| LedgerError::Cache {
            message: format!("failed to create cache directory: {}", e),
        })?;

    let existing = if snapshot_dir.is_dir() {
        read_metadata(&meta_path)
            .await
            .ok()
            .filter(|meta| meta.commit_hash == req.commit_hash)
    } else {
        None
    };

    let mut metadata = match existing {
        Some(meta) => {
            // Same commit: keep the snapshot readers may be using.
            if req.staged != snapshot_dir.as_path() {
                remove_dir_if_exists(req.staged)
                    .await
                    .map_err(|e| LedgerError::Cache {
                        message: format!("failed to discard staged snapshot: {}", e),
                    })?;
            }
            meta
        }
        None => {
            replace_snapshot(req.staged, &snapshot_dir, &meta_path).await?;
            CacheMeta {
                repository_url: req.url.to_string(),
                reference: req.reference.to_string(),
                commit_hash: req.commit_hash.to_string(),
                fetched_at: Utc::now(),
                specs: BTreeMap::new(),
            }
        }
    };

    metadata
        .specs
        .insert(req.spec_path.to_string(), req.content_hash.to_string());
    write_metadata(&meta_path, &metadata).await?;

    debug!(
        url = req.url,
        reference = req.reference,
        commit = req.commit_hash,
        spec_path = req.spec_path,
        "cached snapshot"
    );
    Ok(())
}

async fn replace_snapshot(staged: &Path, snapshot_dir: &Path, meta_path: &Path) -> LedgerResult<()> {
    // Metadata goes first so a crash in between leaves a miss, not a stale hit.
    match fs::remove_file(meta_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(LedgerError::Cache {
                message: format!("failed to remove stale metadata: {}", e),
            })
        }
    }

    remove_dir_if_exists(snapshot_dir)
        .await
        .map_err(|e| LedgerError::Cache {
            message: format!("failed to remove stale snapshot: {}", e),
        })?;

    fs::rename(staged, snapshot_dir)
        .await
        .map_err(|e| LedgerError::Cache {
            message: format!("failed to move snapshot into cache: {}", e),
        })
}
