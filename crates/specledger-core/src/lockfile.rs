//! Resolved dependencies.
//!
//! The lockfile (`specledger/specledger.sum`) records exactly what a
//! resolution run fetched: the commit each dependency resolved to and the
//! content hash and size of its spec file. It is regenerated wholesale on
//! every successful resolution and never merged into.
//!
//! # Lockfile Format
//!
//! ```yaml
//! version: 1.0.0
//! entries:
//!   - repository_url: git@github.com:org/api-spec
//!     commit_hash: 9f2c1e4b7a...
//!     content_hash: 6ae8a75555209fd6c44157c0aed8016e763ff435a19cf186f76863140143ff72
//!     spec_path: specs/api.md
//!     branch: v1.0
//!     alias: api
//!     size: 4210
//!     fetched_at: "2026-01-29T10:00:00Z"
//! total_size: 4210
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::digest::is_content_hash;
use crate::error::{LedgerError, LedgerResult};
use crate::manifest::{is_supported_format, Manifest};
use crate::resolver::ResolvedDependency;

/// Default lockfile name.
pub const LOCKFILE_NAME: &str = "specledger.sum";

/// A locked dependency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockfileEntry {
    /// Repository URL.
    pub repository_url: String,

    /// Commit the ref resolved to at fetch time.
    pub commit_hash: String,

    /// Content hash of the spec file.
    pub content_hash: String,

    /// Path to the spec file inside the repository.
    pub spec_path: String,

    /// Ref used at resolution time.
    pub branch: String,

    /// Alias declared for the dependency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Byte length of the spec file.
    pub size: u64,

    /// When the content was fetched.
    pub fetched_at: DateTime<Utc>,
}

impl LockfileEntry {
    /// Whether this entry has the identity key `(url, spec_path)`.
    pub fn is_keyed(&self, url: &str, spec_path: &str) -> bool {
        self.repository_url == url && self.spec_path == spec_path
    }

    /// Build an entry from one resolution result.
    pub fn from_resolved(resolved: &ResolvedDependency) -> Self {
        let dependency = &resolved.dependency;
        Self {
            repository_url: dependency.repository_url.clone(),
            commit_hash: resolved.commit_hash.clone(),
            content_hash: resolved.content_hash.clone(),
            spec_path: dependency.spec_path.clone(),
            branch: dependency.version.clone(),
            alias: dependency.alias().map(String::from),
            size: resolved.size,
            fetched_at: resolved.fetched_at,
        }
    }
}

/// A manifest dependency with no matching lockfile entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockIssue {
    /// Repository URL of the unlocked dependency.
    pub repository_url: String,

    /// Spec path of the unlocked dependency.
    pub spec_path: String,
}

impl std::fmt::Display for LockIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "missing lock entry for {} [{}]",
            self.repository_url, self.spec_path
        )
    }
}

/// A dependency lockfile.
///
/// `total_size` always equals the sum of entry sizes; it is maintained on
/// every add and remove rather than recomputed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Lockfile {
    /// Format version, matching the manifest it was generated from.
    pub version: String,

    #[serde(default)]
    entries: Vec<LockfileEntry>,

    #[serde(default)]
    total_size: u64,
}

impl Lockfile {
    /// Create a new empty lockfile.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            entries: Vec::new(),
            total_size: 0,
        }
    }

    /// Build a lockfile from resolution results, preserving their order.
    pub fn from_resolved(version: impl Into<String>, resolved: &[ResolvedDependency]) -> Self {
        let mut lockfile = Self::new(version);
        for result in resolved {
            lockfile.add_entry(LockfileEntry::from_resolved(result));
        }
        lockfile
    }

    /// Locked entries, in insertion order.
    pub fn entries(&self) -> &[LockfileEntry] {
        &self.entries
    }

    /// Sum of entry sizes.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Append an entry. Entries are not deduplicated.
    ///
    /// `total_size` saturates at `u64::MAX`; such a lockfile is rejected by
    /// [`Lockfile::parse`] rather than written with a wrapped total.
    pub fn add_entry(&mut self, entry: LockfileEntry) {
        self.total_size = self.total_size.saturating_add(entry.size);
        self.entries.push(entry);
    }

    /// Remove the first entry keyed by `(url, spec_path)`.
    pub fn remove_entry(&mut self, url: &str, spec_path: &str) -> bool {
        match self.entries.iter().position(|e| e.is_keyed(url, spec_path)) {
            Some(index) => {
                let removed = self.entries.remove(index);
                self.total_size = self.total_size.saturating_sub(removed.size);
                true
            }
            None => false,
        }
    }

    /// Get the entry keyed by `(url, spec_path)`.
    pub fn get_entry(&self, url: &str, spec_path: &str) -> Option<&LockfileEntry> {
        self.entries.iter().find(|e| e.is_keyed(url, spec_path))
    }

    /// All entries for a repository, in insertion order.
    pub fn get_repository_entries(&self, url: &str) -> Vec<&LockfileEntry> {
        self.entries
            .iter()
            .filter(|e| e.repository_url == url)
            .collect()
    }

    /// Alias → repository URL for every entry that carries an alias.
    pub fn alias_map(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .filter_map(|e| {
                e.alias
                    .as_deref()
                    .filter(|a| !a.is_empty())
                    .map(|a| (a.to_string(), e.repository_url.clone()))
            })
            .collect()
    }

    /// Manifest dependencies that have no entry, one issue each.
    pub fn missing_entries(&self, manifest: &Manifest) -> Vec<LockIssue> {
        manifest
            .dependencies
            .iter()
            .filter(|d| self.get_entry(&d.repository_url, &d.spec_path).is_none())
            .map(|d| LockIssue {
                repository_url: d.repository_url.clone(),
                spec_path: d.spec_path.clone(),
            })
            .collect()
    }

    /// Check that every manifest dependency is locked.
    ///
    /// Content hashes are not re-verified against remote content here.
    pub fn verify(&self, manifest: &Manifest) -> LedgerResult<()> {
        let issues = self.missing_entries(manifest);
        if issues.is_empty() {
            debug!(entries = self.entries.len(), "lockfile covers manifest");
            Ok(())
        } else {
            Err(LedgerError::LockfileIncomplete { issues })
        }
    }

    /// Parse a lockfile from YAML content.
    pub fn parse(content: &str) -> LedgerResult<Self> {
        let lockfile: Lockfile =
            serde_yaml::from_str(content).map_err(|e| LedgerError::MalformedLockfile {
                message: format!("failed to parse lockfile: {}", e),
            })?;

        if !is_supported_format(&lockfile.version) {
            return Err(LedgerError::MalformedLockfile {
                message: format!("lockfile version {} is not supported", lockfile.version),
            });
        }

        for entry in &lockfile.entries {
            if !is_content_hash(&entry.content_hash) {
                return Err(LedgerError::MalformedLockfile {
                    message: format!(
                        "entry {} [{}] has an invalid content_hash {:?}",
                        entry.repository_url, entry.spec_path, entry.content_hash
                    ),
                });
            }
        }

        let sum = lockfile
            .entries
            .iter()
            .try_fold(0_u64, |acc, e| acc.checked_add(e.size))
            .ok_or_else(|| LedgerError::MalformedLockfile {
                message: "sum of entry sizes overflows".to_string(),
            })?;
        if sum != lockfile.total_size {
            return Err(LedgerError::MalformedLockfile {
                message: format!(
                    "total_size {} does not match the sum of entry sizes {}",
                    lockfile.total_size, sum
                ),
            });
        }

        Ok(lockfile)
    }

    /// Convert to YAML string.
    pub fn to_yaml(&self) -> LedgerResult<String> {
        serde_yaml::to_string(self).map_err(|e| LedgerError::MalformedLockfile {
            message: format!("failed to serialize lockfile: {}", e),
        })
    }

    /// Read a lockfile from a path.
    pub async fn read(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| LedgerError::io(path, e))?;

        Self::parse(&content)
    }

    /// Write the lockfile to a path atomically.
    pub async fn write(&self, path: impl AsRef<Path>) -> LedgerResult<()> {
        let path = path.as_ref();
        let content = self.to_yaml()?;

        crate::io::write_atomic(path, content.as_bytes())
            .await
            .map_err(|e| LedgerError::io(path, e))?;

        info!(
            path = %path.display(),
            entries = self.entries.len(),
            total_size = self.total_size,
            "saved lockfile"
        );
        Ok(())
    }
}
