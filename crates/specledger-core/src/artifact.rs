//! Artifact-path discovery for dependencies that are SpecLedger projects.

use std::path::Path;

use serde::Deserialize;
use tokio::fs;
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::manifest::{DEFAULT_SPEC_PATH, MANIFEST_NAME, PROJECT_DIR};

/// Only the field we probe; the rest of a foreign manifest is not validated.
#[derive(Debug, Deserialize)]
struct ArtifactProbe {
    #[serde(default)]
    artifact_path: Option<String>,
}

/// Read the `artifact_path` declared by the SpecLedger project checked out at
/// `repo_dir`.
///
/// Looks for `specledger/specledger.yaml`, then `specledger.yaml` at the root.
pub async fn detect_artifact_path(repo_dir: &Path) -> LedgerResult<String> {
    let candidates = [
        repo_dir.join(PROJECT_DIR).join(MANIFEST_NAME),
        repo_dir.join(MANIFEST_NAME),
    ];

    let not_specledger = |reason: String| LedgerError::NotASpecLedgerRepo {
        url: repo_dir.display().to_string(),
        reason,
    };

    let mut found = None;
    for candidate in &candidates {
        match fs::read(candidate).await {
            Ok(content) => {
                found = Some((candidate, content));
                break;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(LedgerError::io(candidate, e)),
        }
    }

    let Some((path, content)) = found else {
        return Err(not_specledger(format!(
            "no {}/{} found",
            PROJECT_DIR, MANIFEST_NAME
        )));
    };

    let probe: ArtifactProbe = serde_yaml::from_slice(&content)
        .map_err(|e| not_specledger(format!("failed to parse {}: {}", path.display(), e)))?;

    let artifact_path = probe
        .artifact_path
        .map(|p| p.trim().to_string())
        .unwrap_or_default();
    if artifact_path.is_empty() {
        return Err(LedgerError::InvalidDependency {
            url: repo_dir.display().to_string(),
            reason: format!("artifact_path is empty in {}", MANIFEST_NAME),
        });
    }

    debug!(path = %path.display(), artifact_path = %artifact_path, "detected artifact path");
    Ok(artifact_path)
}

/// Spec file a dependency should point at for a detected `artifact_path`.
///
/// An artifact path naming a directory in the checkout (or written with a
/// trailing `/`) resolves to the `spec.md` inside it.
pub async fn artifact_spec_path(repo_dir: &Path, artifact_path: &str) -> String {
    let is_dir = artifact_path.ends_with('/')
        || fs::metadata(repo_dir.join(artifact_path))
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
    if !is_dir {
        return artifact_path.to_string();
    }

    let dir = artifact_path.trim_end_matches('/');
    if dir.is_empty() || dir == "." {
        DEFAULT_SPEC_PATH.to_string()
    } else {
        format!("{}/{}", dir, DEFAULT_SPEC_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(path, content).await.unwrap();
    }

    #[tokio::test]
    async fn test_detects_from_project_dir() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "specledger/specledger.yaml",
            "version: 1.0.0\nartifact_path: specs/api.md\ndependencies: []\n",
        )
        .await;

        assert_eq!(detect_artifact_path(dir.path()).await.unwrap(), "specs/api.md");
    }

    #[tokio::test]
    async fn test_falls_back_to_root_manifest() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "specledger.yaml", "artifact_path: docs/spec.md\n").await;

        assert_eq!(detect_artifact_path(dir.path()).await.unwrap(), "docs/spec.md");
    }

    #[tokio::test]
    async fn test_plain_repository_is_rejected() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "README.md", "# hi\n").await;

        let err = detect_artifact_path(dir.path()).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotASpecLedgerRepo { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_empty_artifact_path_is_invalid() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "specledger/specledger.yaml", "artifact_path: \"  \"\n").await;

        let err = detect_artifact_path(dir.path()).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidDependency { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_directory_artifact_points_at_its_spec_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "docs/spec.md", "# Docs\n").await;
        write(dir.path(), "api.md", "# Api\n").await;

        assert_eq!(artifact_spec_path(dir.path(), "specs/").await, "specs/spec.md");
        assert_eq!(artifact_spec_path(dir.path(), "docs").await, "docs/spec.md");
        assert_eq!(artifact_spec_path(dir.path(), "./").await, "spec.md");
        assert_eq!(artifact_spec_path(dir.path(), "api.md").await, "api.md");
        assert_eq!(artifact_spec_path(dir.path(), "missing.md").await, "missing.md");
    }
}
