//! Error types for manifest, lockfile and resolution operations.

use crate::lockfile::LockIssue;

/// SpecLedger errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Manifest is not a valid document.
    #[error("malformed manifest: {message}")]
    MalformedManifest { message: String },

    /// Lockfile is not a valid document.
    #[error("malformed lockfile: {message}")]
    MalformedLockfile { message: String },

    /// A declared dependency failed shape validation.
    #[error("invalid dependency {url}: {reason}")]
    InvalidDependency { url: String, reason: String },

    /// A dependency with the same repository URL is already declared.
    #[error("dependency already exists: {url}")]
    DuplicateDependency { url: String },

    /// A dependency with the same alias is already declared.
    #[error("alias already exists: {alias} (used by {existing_url})")]
    AliasCollision { alias: String, existing_url: String },

    /// Remove/lookup target does not exist.
    #[error("dependency not found: {target}")]
    DependencyNotFound { target: String },

    /// Transport failed to fetch a snapshot.
    #[error("failed to clone {url}@{reference}: {message}")]
    CloneFailed {
        url: String,
        reference: String,
        message: String,
    },

    /// Cached snapshot no longer matches its write-time content hash.
    #[error("cache entry for {url}@{reference} is corrupt: expected {expected}, got {actual}")]
    CacheCorrupt {
        url: String,
        reference: String,
        expected: String,
        actual: String,
    },

    /// Declared spec path does not exist in the snapshot.
    #[error("spec file {spec_path} not found in {url}@{reference}")]
    SpecFileNotFound {
        url: String,
        reference: String,
        spec_path: String,
    },

    /// Manifest dependencies without a lockfile entry.
    #[error("lockfile is out of date: {} dependency(ies) not locked ({})", .issues.len(), describe_issues(.issues))]
    LockfileIncomplete { issues: Vec<LockIssue> },

    /// Repository has no SpecLedger metadata to discover an artifact path from.
    #[error("not a SpecLedger repository ({url}): {reason}")]
    NotASpecLedgerRepo { url: String, reason: String },

    /// Cache error.
    #[error("cache error: {message}")]
    Cache { message: String },

    /// Filesystem error outside the cache.
    #[error("io error on {path}: {message}")]
    Io { path: String, message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Resolution was cancelled before it completed.
    #[error("resolution cancelled")]
    Cancelled,

    /// A resolution worker failed unexpectedly.
    #[error("internal error: {message}")]
    Internal { message: String },
}

fn describe_issues(issues: &[LockIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("{} [{}]", issue.repository_url, issue.spec_path))
        .collect::<Vec<_>>()
        .join(", ")
}

impl LedgerError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Declared state / usage
            Self::MalformedManifest { .. } => 1,
            Self::InvalidDependency { .. } => 1,
            Self::DuplicateDependency { .. } => 1,
            Self::AliasCollision { .. } => 1,
            Self::DependencyNotFound { .. } => 1,
            Self::NotASpecLedgerRepo { .. } => 1,
            Self::Config { .. } => 1,

            // Integrity
            Self::CacheCorrupt { .. } => 3,
            Self::SpecFileNotFound { .. } => 3,

            // Fetch
            Self::CloneFailed { .. } => 4,

            // Local storage
            Self::Cache { .. } => 5,
            Self::Io { .. } => 5,
            Self::Internal { .. } => 5,

            // Resolved state
            Self::MalformedLockfile { .. } => 6,
            Self::LockfileIncomplete { .. } => 6,

            Self::Cancelled => 130,
        }
    }

    /// Whether a caller-level retry could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CloneFailed { .. })
    }

    pub(crate) fn io(path: impl AsRef<std::path::Path>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type for SpecLedger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let err = LedgerError::CloneFailed {
            url: "https://github.com/example/repo".to_string(),
            reference: "main".to_string(),
            message: "repository not found".to_string(),
        };
        assert_eq!(err.exit_code(), 4);
        assert!(err.is_retryable());

        let err = LedgerError::SpecFileNotFound {
            url: "https://github.com/example/repo".to_string(),
            reference: "main".to_string(),
            spec_path: "spec.md".to_string(),
        };
        assert_eq!(err.exit_code(), 3);
        assert!(!err.is_retryable());
        assert_eq!(LedgerError::Cancelled.exit_code(), 130);
    }

    #[test]
    fn test_incomplete_lockfile_message_names_dependencies() {
        let err = LedgerError::LockfileIncomplete {
            issues: vec![LockIssue {
                repository_url: "https://github.com/example/repo".to_string(),
                spec_path: "specs/test.md".to_string(),
            }],
        };
        let message = err.to_string();
        assert!(message.contains("1 dependency(ies)"));
        assert!(message.contains("https://github.com/example/repo [specs/test.md]"));
    }
}
