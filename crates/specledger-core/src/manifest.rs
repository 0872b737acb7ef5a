//! Declared dependencies.
//!
//! The manifest (`specledger/specledger.yaml`) records what a project wants:
//! which repositories to pull specifications from, at which ref, and under
//! which alias inline references may address them.
//!
//! # Manifest Format
//!
//! ```yaml
//! version: 1.0.0
//! updated_at: "2026-01-29T10:00:00Z"
//! dependencies:
//!   - repository_url: git@github.com:org/api-spec
//!     version: v1.0
//!     spec_path: specs/api.md
//!     alias: api
//!   - repository_url: https://github.com/org/platform
//! ```
//!
//! `version` and `spec_path` default to `main` and `spec.md`. The keys used by
//! earlier releases (`url`, `branch`, `path`) are accepted on read.

use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{LedgerError, LedgerResult};
use crate::reference::is_valid_alias;

/// Directory holding the manifest and lockfile inside a project.
pub const PROJECT_DIR: &str = "specledger";

/// Default manifest file name.
pub const MANIFEST_NAME: &str = "specledger.yaml";

/// Current manifest format version.
pub const MANIFEST_VERSION: &str = "1.0.0";

/// Default ref when a dependency does not name one.
pub const DEFAULT_VERSION: &str = "main";

/// Default spec file inside a dependency repository.
pub const DEFAULT_SPEC_PATH: &str = "spec.md";

const SUPPORTED_FORMAT_MAJOR: u64 = 1;

/// A declared specification dependency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dependency {
    /// Git-style repository URL.
    #[serde(alias = "url")]
    pub repository_url: String,

    /// Branch, tag or ref to resolve.
    #[serde(default = "default_version", alias = "branch")]
    pub version: String,

    /// Path to the spec file inside the repository.
    #[serde(default = "default_spec_path", alias = "path")]
    pub spec_path: String,

    /// Short name used by inline references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

fn default_spec_path() -> String {
    DEFAULT_SPEC_PATH.to_string()
}

impl Dependency {
    /// Declare a dependency with the default ref and spec path.
    pub fn new(repository_url: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
            version: default_version(),
            spec_path: default_spec_path(),
            alias: None,
        }
    }

    /// Set the ref.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the spec path.
    pub fn with_spec_path(mut self, spec_path: impl Into<String>) -> Self {
        self.spec_path = spec_path.into();
        self
    }

    /// Set the alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Alias, if one is set and non-empty.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref().filter(|a| !a.is_empty())
    }

    /// Whether `target` names this dependency by URL or alias.
    pub fn matches(&self, target: &str) -> bool {
        self.repository_url == target || self.alias() == Some(target)
    }

    /// Shape validation that does not depend on other dependencies.
    pub fn validate(&self) -> LedgerResult<()> {
        let invalid = |reason: &str| LedgerError::InvalidDependency {
            url: self.repository_url.clone(),
            reason: reason.to_string(),
        };

        if !is_valid_git_url(&self.repository_url) {
            return Err(invalid(
                "repository URL must start with http://, https:// or git@",
            ));
        }

        if self.version.trim().is_empty() {
            return Err(invalid("version must not be empty"));
        }

        if self.spec_path.trim().is_empty() {
            return Err(invalid("spec path must not be empty"));
        }

        if !is_contained_path(&self.spec_path) {
            return Err(invalid(
                "spec path must be relative and stay inside the repository",
            ));
        }

        if let Some(alias) = self.alias() {
            if !is_valid_alias(alias) {
                return Err(invalid(
                    "alias must start with a letter or digit and contain only letters, digits, '-' or '_'",
                ));
            }
        }

        Ok(())
    }
}

/// Whether a string looks like a git remote.
pub fn is_valid_git_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .or_else(|| url.strip_prefix("git@"));

    matches!(rest, Some(r) if !r.is_empty() && !r.chars().any(char::is_whitespace))
}

fn is_contained_path(path: &str) -> bool {
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// The declared dependency set of a project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// Manifest format version.
    #[serde(default = "default_manifest_version")]
    pub version: String,

    /// When the manifest was last written.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    /// Where this project's own specification lives, for projects that are
    /// themselves depended upon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,

    /// Declared dependencies, in declaration order.
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

fn default_manifest_version() -> String {
    MANIFEST_VERSION.to_string()
}

impl Manifest {
    /// Create a new empty manifest.
    pub fn new() -> Self {
        Self {
            version: default_manifest_version(),
            updated_at: Utc::now(),
            artifact_path: None,
            dependencies: Vec::new(),
        }
    }

    /// Load a manifest from a path.
    pub async fn load(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();

        let content = fs::read(path).await.map_err(|e| LedgerError::io(path, e))?;

        let manifest = Self::parse(&content)?;
        debug!(
            path = %path.display(),
            dependencies = manifest.dependencies.len(),
            "loaded manifest"
        );
        Ok(manifest)
    }

    /// Parse and validate a manifest document.
    ///
    /// Unknown top-level keys are ignored. A document that is not a mapping,
    /// a dependency without `repository_url`, an invalid dependency or a
    /// duplicate URL/alias is rejected.
    pub fn parse(content: &[u8]) -> LedgerResult<Self> {
        let manifest: Manifest =
            serde_yaml::from_slice(content).map_err(|e| LedgerError::MalformedManifest {
                message: format!("failed to parse manifest: {}", e),
            })?;

        if !is_supported_format(&manifest.version) {
            return Err(LedgerError::MalformedManifest {
                message: format!(
                    "manifest version {} is not supported (expected {}.x)",
                    manifest.version, SUPPORTED_FORMAT_MAJOR
                ),
            });
        }

        let mut checked = Manifest {
            dependencies: Vec::with_capacity(manifest.dependencies.len()),
            ..manifest.clone()
        };
        for dependency in manifest.dependencies {
            checked
                .add(dependency)
                .map_err(|e| LedgerError::MalformedManifest {
                    message: e.to_string(),
                })?;
        }

        Ok(checked)
    }

    /// Serialize to YAML, stamping `updated_at`.
    pub fn to_yaml(&mut self) -> LedgerResult<String> {
        self.updated_at = Utc::now();
        serde_yaml::to_string(self).map_err(|e| LedgerError::MalformedManifest {
            message: format!("failed to serialize manifest: {}", e),
        })
    }

    /// Save the manifest to a path atomically.
    pub async fn save(&mut self, path: impl AsRef<Path>) -> LedgerResult<()> {
        let path = path.as_ref();
        let content = self.to_yaml()?;

        crate::io::write_atomic(path, content.as_bytes())
            .await
            .map_err(|e| LedgerError::io(path, e))?;

        info!(path = %path.display(), "saved manifest");
        Ok(())
    }

    /// Check a candidate dependency against its own shape and the existing set.
    pub fn validate(&self, dependency: &Dependency) -> LedgerResult<()> {
        dependency.validate()?;

        for existing in &self.dependencies {
            if existing.repository_url == dependency.repository_url {
                return Err(LedgerError::DuplicateDependency {
                    url: dependency.repository_url.clone(),
                });
            }
            if let Some(alias) = dependency.alias() {
                if existing.alias() == Some(alias) {
                    return Err(LedgerError::AliasCollision {
                        alias: alias.to_string(),
                        existing_url: existing.repository_url.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Add a dependency. The manifest is unchanged when validation fails.
    pub fn add(&mut self, dependency: Dependency) -> LedgerResult<()> {
        self.validate(&dependency)?;
        self.dependencies.push(dependency);
        Ok(())
    }

    /// Remove the dependency named by URL or alias.
    ///
    /// Returns `false` when nothing matched.
    pub fn remove(&mut self, url_or_alias: &str) -> bool {
        match self
            .dependencies
            .iter()
            .position(|d| d.matches(url_or_alias))
        {
            Some(index) => {
                self.dependencies.remove(index);
                true
            }
            None => false,
        }
    }

    /// Find a dependency by URL or alias.
    pub fn find(&self, url_or_alias: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|d| d.matches(url_or_alias))
    }

    /// Number of declared dependencies.
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    /// Whether no dependencies are declared.
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn is_supported_format(version: &str) -> bool {
    version
        .trim_start_matches('v')
        .split('.')
        .next()
        .and_then(|major| major.parse::<u64>().ok())
        .is_some_and(|major| major <= SUPPORTED_FORMAT_MAJOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn api_dependency() -> Dependency {
        Dependency::new("git@github.com:org/api-spec")
            .with_version("v1.0")
            .with_spec_path("specs/api.md")
            .with_alias("api")
    }

    #[test]
    fn test_dependency_defaults() {
        let dep = Dependency::new("https://github.com/example/repo");
        assert_eq!(dep.version, "main");
        assert_eq!(dep.spec_path, "spec.md");
        assert!(dep.alias().is_none());
    }

    #[test]
    fn test_git_url_shapes() {
        assert!(is_valid_git_url("https://github.com/example/repo"));
        assert!(is_valid_git_url("http://git.internal/specs"));
        assert!(is_valid_git_url("git@github.com:org/spec"));
        assert!(!is_valid_git_url("github.com/example/repo"));
        assert!(!is_valid_git_url("https://"));
        assert!(!is_valid_git_url("ftp://example.com/repo"));
        assert!(!is_valid_git_url("https://github.com/example repo"));
    }

    #[test]
    fn test_validate_rejects_bad_shapes() {
        let bad_url = Dependency::new("example/repo");
        assert!(matches!(
            bad_url.validate(),
            Err(LedgerError::InvalidDependency { .. })
        ));

        let empty_path = Dependency::new("https://github.com/example/repo").with_spec_path("");
        assert!(matches!(
            empty_path.validate(),
            Err(LedgerError::InvalidDependency { .. })
        ));

        let escaping = Dependency::new("https://github.com/example/repo")
            .with_spec_path("../outside.md");
        assert!(matches!(
            escaping.validate(),
            Err(LedgerError::InvalidDependency { .. })
        ));

        let bad_alias = Dependency::new("https://github.com/example/repo").with_alias("my alias");
        assert!(matches!(
            bad_alias.validate(),
            Err(LedgerError::InvalidDependency { .. })
        ));
    }

    #[test]
    fn test_add_rejects_duplicate_url_without_mutation() {
        let mut manifest = Manifest::new();
        manifest.add(api_dependency()).unwrap();

        let duplicate = Dependency::new("git@github.com:org/api-spec").with_alias("other");
        let err = manifest.add(duplicate).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateDependency { .. }));
        assert_eq!(manifest.dependencies, vec![api_dependency()]);
    }

    #[test]
    fn test_add_rejects_alias_collision_without_mutation() {
        let mut manifest = Manifest::new();
        manifest.add(api_dependency()).unwrap();

        let colliding = Dependency::new("https://github.com/org/other").with_alias("api");
        let err = manifest.add(colliding).unwrap_err();
        match err {
            LedgerError::AliasCollision {
                alias,
                existing_url,
            } => {
                assert_eq!(alias, "api");
                assert_eq!(existing_url, "git@github.com:org/api-spec");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_empty_aliases_never_collide() {
        let mut manifest = Manifest::new();
        manifest
            .add(Dependency::new("https://github.com/org/a").with_alias(""))
            .unwrap();
        manifest
            .add(Dependency::new("https://github.com/org/b").with_alias(""))
            .unwrap();
        assert_eq!(manifest.len(), 2);
    }

    #[test]
    fn test_remove_by_url_or_alias() {
        let mut manifest = Manifest::new();
        manifest.add(api_dependency()).unwrap();
        manifest
            .add(Dependency::new("https://github.com/org/platform"))
            .unwrap();

        assert!(manifest.remove("api"));
        assert!(!manifest.remove("api"));
        assert!(manifest.remove("https://github.com/org/platform"));
        assert!(manifest.is_empty());
    }

    #[test]
    fn test_parse_applies_defaults_and_ignores_unknown_keys() {
        let yaml = r#"
version: 1.0.0
updated_at: "2026-01-29T10:00:00Z"
project:
  name: demo
dependencies:
  - repository_url: https://github.com/example/repo
  - url: git@github.com:org/api-spec
    branch: v1.0
    path: specs/api.md
    alias: api
"#;

        let manifest = Manifest::parse(yaml.as_bytes()).unwrap();
        assert_eq!(manifest.version, "1.0.0");
        assert_eq!(manifest.dependencies.len(), 2);
        assert_eq!(manifest.dependencies[0].version, "main");
        assert_eq!(manifest.dependencies[0].spec_path, "spec.md");
        assert_eq!(manifest.dependencies[1], api_dependency());
    }

    #[test]
    fn test_parse_rejects_structural_errors() {
        let not_a_mapping = "- just\n- a list\n";
        assert!(matches!(
            Manifest::parse(not_a_mapping.as_bytes()),
            Err(LedgerError::MalformedManifest { .. })
        ));

        let missing_url = "version: 1.0.0\ndependencies:\n  - version: main\n";
        assert!(matches!(
            Manifest::parse(missing_url.as_bytes()),
            Err(LedgerError::MalformedManifest { .. })
        ));

        let duplicate = r#"
dependencies:
  - repository_url: https://github.com/example/repo
  - repository_url: https://github.com/example/repo
"#;
        assert!(matches!(
            Manifest::parse(duplicate.as_bytes()),
            Err(LedgerError::MalformedManifest { .. })
        ));

        let future = "version: 2.0.0\ndependencies: []\n";
        assert!(matches!(
            Manifest::parse(future.as_bytes()),
            Err(LedgerError::MalformedManifest { .. })
        ));
    }

    #[test]
    fn test_to_yaml_stamps_updated_at() {
        let mut manifest = Manifest::new();
        manifest.updated_at = DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let yaml = manifest.to_yaml().unwrap();
        assert!(manifest.updated_at.timestamp() > 1_600_000_000);
        assert!(!yaml.contains("2020-01-01"));
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PROJECT_DIR).join(MANIFEST_NAME);

        let mut manifest = Manifest::new();
        manifest.add(api_dependency()).unwrap();
        manifest
            .add(Dependency::new("https://github.com/org/platform"))
            .unwrap();
        manifest.save(&path).await.unwrap();

        let loaded = Manifest::load(&path).await.unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.dependencies[0].alias(), Some("api"));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = Manifest::load(dir.path().join("nope.yaml")).await;
        assert!(matches!(result, Err(LedgerError::Io { .. })));
    }
}
