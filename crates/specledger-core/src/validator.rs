//! Reference integrity checks against the resolved dependency set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::lockfile::Lockfile;
use crate::reference::{parse_references, Reference, ReferenceKind, SourcePosition};

/// A reference that does not resolve to a locked dependency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationError {
    /// Offending reference field.
    pub field: String,

    /// Human-readable description.
    pub message: String,

    /// Alias that failed to resolve.
    pub alias: String,

    /// Normalized reference text.
    pub reference: String,

    /// Where the reference starts.
    pub position: SourcePosition,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}: {} ({})",
            self.position, self.field, self.message, self.reference
        )
    }
}

impl std::error::Error for ValidationError {}

/// Validates inline references against an alias → repository URL map.
#[derive(Debug, Clone, Default)]
pub struct ReferenceValidator {
    dependencies: BTreeMap<String, String>,
}

impl ReferenceValidator {
    /// Create a validator over an alias map.
    pub fn new(dependencies: BTreeMap<String, String>) -> Self {
        Self { dependencies }
    }

    /// Create a validator from the aliases recorded in a lockfile.
    pub fn from_lockfile(lockfile: &Lockfile) -> Self {
        Self::new(lockfile.alias_map())
    }

    /// Known aliases.
    pub fn dependencies(&self) -> &BTreeMap<String, String> {
        &self.dependencies
    }

    /// Repository URL an alias resolves to.
    pub fn resolve_alias(&self, alias: &str) -> Option<&str> {
        self.dependencies.get(alias).map(String::as_str)
    }

    /// Check every inline reference; markdown links and images are not checked.
    ///
    /// All problems are reported in one pass, in reference order.
    pub fn validate(&self, references: &[Reference]) -> Vec<ValidationError> {
        let errors: Vec<ValidationError> = references
            .iter()
            .filter(|r| r.kind == ReferenceKind::Inline)
            .filter_map(|r| {
                let alias = r.alias()?;
                if self.dependencies.contains_key(alias) {
                    return None;
                }
                Some(ValidationError {
                    field: "url".to_string(),
                    message: format!("unknown dependency: {}", alias),
                    alias: alias.to_string(),
                    reference: r.url.clone(),
                    position: r.position,
                })
            })
            .collect();

        debug!(
            references = references.len(),
            errors = errors.len(),
            "validated references"
        );
        errors
    }

    /// Parse and validate a document.
    pub fn validate_text(&self, text: &str) -> Vec<ValidationError> {
        self.validate(&parse_references(text))
    }
}
