//! Dependency resolution.
//!
//! Turns each manifest dependency into a verified snapshot of its spec file:
//! 1. Cache (unless `no_cache`), re-hashed against the write-time hash
//! 2. Remote (shallow clone through the [`CloneTransport`])
//!
//! Dependencies are resolved concurrently up to `max_parallel`; results are
//! returned in manifest order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::artifact::{artifact_spec_path, detect_artifact_path};
use crate::cache::{cache_key, SnapshotCache};
use crate::digest::content_hash;
use crate::error::{LedgerError, LedgerResult};
use crate::manifest::{Dependency, Manifest};
use crate::transport::CloneTransport;

/// Default number of concurrent fetches.
pub const DEFAULT_MAX_PARALLEL: usize = 4;

/// Where a resolved dependency came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResolveSource {
    /// Verified snapshot from the local cache.
    Cache,

    /// Fresh clone of the remote repository.
    Remote,
}

impl std::fmt::Display for ResolveSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// A dependency resolved to a concrete commit and spec content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    /// The declared dependency.
    pub dependency: Dependency,

    /// Commit the ref resolved to.
    pub commit_hash: String,

    /// Content hash of the spec file.
    pub content_hash: String,

    /// Byte length of the spec file.
    pub size: u64,

    /// Where the content came from.
    pub source: ResolveSource,

    /// When the snapshot was fetched from the remote.
    pub fetched_at: DateTime<Utc>,
}

/// What to do when a dependency fails to resolve.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Stop at the first failing dependency.
    #[default]
    FailFast,

    /// Resolve everything possible; fail only if nothing resolved.
    CollectAll,
}

/// Resolver configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResolverConfig {
    /// Cache directory; `None` uses `~/.specledger/cache`.
    pub cache_dir: Option<PathBuf>,

    /// Skip cache lookup. Fresh fetches still refresh the cache.
    pub no_cache: bool,

    /// Failure policy.
    pub strictness: Strictness,

    /// Maximum concurrent fetches.
    pub max_parallel: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            no_cache: false,
            strictness: Strictness::FailFast,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }
}

impl ResolverConfig {
    /// Load configuration from `SPECLEDGER_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(get: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str| {
            get(name)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        };

        let mut config = Self::default();
        if let Some(dir) = get("SPECLEDGER_CACHE_DIR").filter(|v| !v.is_empty()) {
            config.cache_dir = Some(PathBuf::from(dir));
        }
        config.no_cache = flag("SPECLEDGER_NO_CACHE");
        if flag("SPECLEDGER_KEEP_GOING") {
            config.strictness = Strictness::CollectAll;
        }
        if let Some(jobs) = get("SPECLEDGER_JOBS").and_then(|v| v.trim().parse::<usize>().ok()) {
            config.max_parallel = jobs.max(1);
        }
        config
    }

    /// Skip cache lookup.
    pub fn no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    /// Collect every failure instead of stopping at the first.
    pub fn keep_going(mut self) -> Self {
        self.strictness = Strictness::CollectAll;
        self
    }

    /// Set the number of concurrent fetches (at least 1).
    pub fn with_parallelism(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Set the cache directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }
}

/// A dependency that could not be resolved.
#[derive(Debug)]
pub struct DependencyFailure {
    /// The declared dependency.
    pub dependency: Dependency,

    /// Why it failed.
    pub error: LedgerError,
}

/// Outcome of a resolution run, in manifest order.
#[derive(Debug, Default)]
pub struct ResolutionReport {
    /// Resolved dependencies.
    pub resolved: Vec<ResolvedDependency>,

    /// Failures; always empty under [`Strictness::FailFast`].
    pub failures: Vec<DependencyFailure>,
}

impl ResolutionReport {
    /// Whether every dependency resolved.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Raises cancellation for the paired [`CancelToken`]s.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Cancel every operation observing the paired token.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed by long-running operations to abandon work.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: Option<watch::Receiver<bool>>,
}

/// Create a connected cancellation handle and token.
pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelToken { rx: Some(rx) })
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// Whether cancellation was raised.
    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Complete once cancellation is raised.
    pub async fn cancelled(&self) {
        if let Some(rx) = &self.rx {
            let mut rx = rx.clone();
            if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
                return;
            }
        }
        // Never cancelled, or the handle is gone.
        std::future::pending::<()>().await
    }
}

/// One async mutex per cache key, so a key has at most one writer.
#[derive(Debug, Default)]
struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.to_string()).or_default().clone()
    }
}

/// Scratch clone directory, removed on drop unless it was moved away.
struct StagingDir(PathBuf);

impl StagingDir {
    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.0) {
                debug!(path = %self.0.display(), error = %e, "failed to remove staging directory");
            }
        }
    }
}

/// Index of the earliest failure in manifest order, once every dependency
/// declared before it has finished.
fn first_settled_failure(slots: &[Option<LedgerResult<ResolvedDependency>>]) -> Option<usize> {
    for (index, slot) in slots.iter().enumerate() {
        match slot {
            None => return None,
            Some(Ok(_)) => continue,
            Some(Err(_)) => return Some(index),
        }
    }
    None
}

/// Resolves manifest dependencies to verified snapshots.
#[derive(Clone)]
pub struct SpecResolver {
    cache: SnapshotCache,
    transport: Arc<dyn CloneTransport>,
    config: ResolverConfig,
    key_locks: Arc<KeyLocks>,
}

impl std::fmt::Debug for SpecResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecResolver")
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SpecResolver {
    /// Create a resolver using the configured (or default) cache directory.
    pub fn new(config: ResolverConfig, transport: Arc<dyn CloneTransport>) -> LedgerResult<Self> {
        let cache = match &config.cache_dir {
            Some(dir) => SnapshotCache::with_dir(dir),
            None => SnapshotCache::new()?,
        };
        Ok(Self::with_components(cache, transport, config))
    }

    /// Create a resolver with explicit components.
    pub fn with_components(
        cache: SnapshotCache,
        transport: Arc<dyn CloneTransport>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            cache,
            transport,
            config,
            key_locks: Arc::new(KeyLocks::default()),
        }
    }

    /// The snapshot cache in use.
    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// The active configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve every manifest dependency.
    ///
    /// Under [`Strictness::FailFast`] the first failure aborts the run and is
    /// returned. Under [`Strictness::CollectAll`] failures are reported in
    /// the returned report, and the run fails only if nothing resolved.
    /// Raising `cancel` abandons in-flight fetches and returns
    /// [`LedgerError::Cancelled`].
    pub async fn resolve(
        &self,
        manifest: &Manifest,
        cancel: &CancelToken,
    ) -> LedgerResult<ResolutionReport> {
        if cancel.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }

        let total = manifest.dependencies.len();
        let fail_fast = self.config.strictness == Strictness::FailFast;
        let sem = Arc::new(Semaphore::new(self.config.max_parallel.max(1)));
        let mut join_set = JoinSet::new();

        for (index, dependency) in manifest.dependencies.iter().enumerate() {
            let this = self.clone();
            let sem = sem.clone();
            let dependency = dependency.clone();
            join_set.spawn(async move {
                let result = match sem.acquire_owned().await {
                    Ok(_permit) => this.resolve_dependency(&dependency).await,
                    Err(e) => Err(LedgerError::Internal {
                        message: format!("worker pool closed: {}", e),
                    }),
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<LedgerResult<ResolvedDependency>>> =
            (0..total).map(|_| None).collect();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    join_set.abort_all();
                    info!(total, "resolution cancelled");
                    return Err(LedgerError::Cancelled);
                }
                next = join_set.join_next() => next,
            };

            match next {
                None => break,
                Some(Ok((index, result))) => slots[index] = Some(result),
                Some(Err(e)) => {
                    join_set.abort_all();
                    return Err(LedgerError::Internal {
                        message: format!("resolution worker failed: {}", e),
                    });
                }
            }

            if fail_fast {
                if let Some(index) = first_settled_failure(&slots) {
                    join_set.abort_all();
                    if let Some(Some(Err(e))) = slots.get_mut(index).map(Option::take) {
                        warn!(
                            url = %manifest.dependencies[index].repository_url,
                            error = %e,
                            "dependency failed, aborting resolution"
                        );
                        return Err(e);
                    }
                }
            }
        }

        let mut report = ResolutionReport::default();
        for (dependency, slot) in manifest.dependencies.iter().zip(slots) {
            match slot {
                Some(Ok(resolved)) => report.resolved.push(resolved),
                Some(Err(error)) => {
                    warn!(url = %dependency.repository_url, error = %error, "dependency failed");
                    report.failures.push(DependencyFailure {
                        dependency: dependency.clone(),
                        error,
                    });
                }
                None => {
                    return Err(LedgerError::Internal {
                        message: format!("no result for {}", dependency.repository_url),
                    })
                }
            }
        }

        if report.resolved.is_empty() && !report.failures.is_empty() {
            return Err(report.failures.remove(0).error);
        }

        let from_cache = report
            .resolved
            .iter()
            .filter(|r| r.source == ResolveSource::Cache)
            .count();
        info!(
            total,
            resolved = report.resolved.len(),
            failed = report.failures.len(),
            from_cache,
            "resolution finished"
        );
        Ok(report)
    }

    /// Resolve a single dependency.
    pub async fn resolve_dependency(&self, dependency: &Dependency) -> LedgerResult<ResolvedDependency> {
        let url = dependency.repository_url.as_str();
        let reference = dependency.version.as_str();
        let spec_path = dependency.spec_path.as_str();

        let lock = self.key_locks.lock_for(&cache_key(url, reference));
        let _guard = lock.lock().await;

        if !self.config.no_cache {
            if let Some(resolved) = self.try_cache(dependency).await? {
                return Ok(resolved);
            }
        }

        let staging = StagingDir(self.cache.staging_path().await?);
        let commit_hash = self
            .transport
            .clone_snapshot(url, reference, staging.path(), true)
            .await?;

        let spec_file = staging.path().join(spec_path);
        let not_found = || LedgerError::SpecFileNotFound {
            url: url.to_string(),
            reference: reference.to_string(),
            spec_path: spec_path.to_string(),
        };
        match fs::metadata(&spec_file).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(not_found()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(LedgerError::io(&spec_file, e)),
        }
        let content = fs::read(&spec_file)
            .await
            .map_err(|e| LedgerError::io(&spec_file, e))?;
        let hash = content_hash(&content);

        if let Err(e) = self
            .cache
            .put(url, reference, staging.path(), &commit_hash, spec_path, &hash)
            .await
        {
            warn!(url, reference, error = %e, "failed to cache snapshot");
        }

        info!(url, reference, commit = %commit_hash, content_hash = %hash, "resolved from remote");
        Ok(ResolvedDependency {
            dependency: dependency.clone(),
            commit_hash,
            content_hash: hash,
            size: content.len() as u64,
            source: ResolveSource::Remote,
            fetched_at: Utc::now(),
        })
    }

    async fn try_cache(&self, dependency: &Dependency) -> LedgerResult<Option<ResolvedDependency>> {
        let url = dependency.repository_url.as_str();
        let reference = dependency.version.as_str();

        match self.cache.get(url, reference, &dependency.spec_path).await {
            Ok(Some(hit)) => {
                info!(url, reference, commit = %hit.metadata.commit_hash, "using cached snapshot");
                Ok(Some(ResolvedDependency {
                    dependency: dependency.clone(),
                    size: hit.content.len() as u64,
                    commit_hash: hit.metadata.commit_hash,
                    content_hash: hit.content_hash,
                    source: ResolveSource::Cache,
                    fetched_at: hit.metadata.fetched_at,
                }))
            }
            Ok(None) => Ok(None),
            Err(LedgerError::CacheCorrupt { .. }) => {
                warn!(url, reference, "cache integrity check failed, evicting");
                self.cache.evict(url, reference).await?;
                Ok(None)
            }
            Err(e) => {
                warn!(url, reference, error = %e, "cache read error");
                Ok(None)
            }
        }
    }

    /// Clone `url` at `version` into scratch space and read the
    /// `artifact_path` it declares, as a spec file path.
    ///
    /// A directory artifact path becomes the `spec.md` inside it.
    pub async fn detect_remote_artifact_path(&self, url: &str, version: &str) -> LedgerResult<String> {
        let staging = StagingDir(self.cache.staging_path().await?);
        self.transport
            .clone_snapshot(url, version, staging.path(), true)
            .await?;

        let artifact_path = detect_artifact_path(staging.path())
            .await
            .map_err(|e| match e {
                LedgerError::NotASpecLedgerRepo { reason, .. } => LedgerError::NotASpecLedgerRepo {
                    url: url.to_string(),
                    reason,
                },
                LedgerError::InvalidDependency { reason, .. } => LedgerError::InvalidDependency {
                    url: url.to_string(),
                    reason,
                },
                other => other,
            })?;
        Ok(artifact_spec_path(staging.path(), &artifact_path).await)
    }
}
