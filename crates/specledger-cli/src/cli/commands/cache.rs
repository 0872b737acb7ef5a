//! `sl cache` - snapshot cache housekeeping.

use anyhow::Result;
use specledger_core::{ResolverConfig, SnapshotCache};

use crate::cli::args::CacheCmd;
use crate::exit_codes::SUCCESS;

fn open_cache() -> Result<SnapshotCache> {
    Ok(match ResolverConfig::from_env().cache_dir {
        Some(dir) => SnapshotCache::with_dir(dir),
        None => SnapshotCache::new()?,
    })
}

pub async fn run(cmd: CacheCmd) -> Result<i32> {
    let cache = open_cache()?;
    match cmd {
        CacheCmd::List => {
            let entries = cache.list().await?;
            if entries.is_empty() {
                println!("Cache is empty ({})", cache.cache_dir().display());
                return Ok(SUCCESS);
            }
            for entry in entries {
                let meta = &entry.metadata;
                println!(
                    "{}@{}  {}  {} spec(s)  fetched {}",
                    meta.repository_url,
                    meta.reference,
                    meta.commit_hash.chars().take(12).collect::<String>(),
                    meta.specs.len(),
                    meta.fetched_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }
        CacheCmd::Clear => {
            cache.clear().await?;
            println!("Cleared {}", cache.cache_dir().display());
        }
    }
    Ok(SUCCESS)
}
