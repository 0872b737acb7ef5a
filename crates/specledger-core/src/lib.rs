//! Specification dependency management.
//!
//! This crate resolves the specification documents a project declares in its
//! manifest to content-verified snapshots, providing:
//!
//! - Manifest (declared dependencies) and lockfile (resolved dependencies)
//! - Local snapshot cache with integrity verification on read
//! - Concurrent resolution (cache → remote clone) with fail-fast or
//!   collect-all policies and cancellation
//! - Reference parsing and inline-reference validation for spec text
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use specledger_core::{
//!     CancelToken, GitCliTransport, Lockfile, Manifest, ResolverConfig, SpecResolver,
//! };
//!
//! # async fn example() -> Result<(), specledger_core::LedgerError> {
//! let manifest = Manifest::load("specledger/specledger.yaml").await?;
//! let resolver = SpecResolver::new(ResolverConfig::from_env(), Arc::new(GitCliTransport::from_env()?))?;
//!
//! let report = resolver.resolve(&manifest, &CancelToken::never()).await?;
//! let lockfile = Lockfile::from_resolved(&manifest.version, &report.resolved);
//! lockfile.verify(&manifest)?;
//! lockfile.write("specledger/specledger.sum").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `SPECLEDGER_CACHE_DIR` | Snapshot cache directory (default: `~/.specledger/cache`) |
//! | `SPECLEDGER_NO_CACHE` | Skip cache lookups |
//! | `SPECLEDGER_JOBS` | Concurrent fetches (default: 4) |
//! | `SPECLEDGER_KEEP_GOING` | Collect all failures instead of failing fast |
//! | `SPECLEDGER_CLONE_TIMEOUT` | Clone timeout in seconds (default: none) |

pub mod artifact;
pub mod cache;
pub mod digest;
pub mod error;
mod io;
pub mod lockfile;
pub mod manifest;
pub mod reference;
pub mod resolver;
pub mod transport;
pub mod validator;

// Re-export main types
pub use artifact::detect_artifact_path;
pub use cache::{CacheListing, CacheMeta, CachedSpec, SnapshotCache};
pub use digest::{content_hash, is_content_hash};
pub use error::{LedgerError, LedgerResult};
pub use lockfile::{LockIssue, Lockfile, LockfileEntry, LOCKFILE_NAME};
pub use manifest::{
    is_valid_git_url, Dependency, Manifest, DEFAULT_SPEC_PATH, DEFAULT_VERSION, MANIFEST_NAME,
    MANIFEST_VERSION, PROJECT_DIR,
};
pub use reference::{
    inline_reference, is_valid_alias, parse_references, Reference, ReferenceKind, SourcePosition,
};
pub use resolver::{
    cancellation, CancelHandle, CancelToken, DependencyFailure, ResolutionReport, ResolveSource,
    ResolvedDependency, ResolverConfig, SpecResolver, Strictness,
};
pub use transport::{CloneTransport, GitCliTransport};
pub use validator::{ReferenceValidator, ValidationError};
