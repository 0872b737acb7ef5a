//! Project discovery.

use anyhow::{Context, Result};
use specledger_core::{LOCKFILE_NAME, MANIFEST_NAME, PROJECT_DIR};
use std::path::{Path, PathBuf};

/// Paths of a SpecLedger project.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
}

impl Project {
    /// Find the nearest ancestor of `start` holding `specledger/specledger.yaml`.
    pub fn discover(start: &Path) -> Result<Self> {
        let root = start
            .ancestors()
            .find(|dir| dir.join(PROJECT_DIR).join(MANIFEST_NAME).is_file())
            .with_context(|| {
                format!(
                    "not inside a SpecLedger project: no {}/{} in {} or any parent",
                    PROJECT_DIR,
                    MANIFEST_NAME,
                    start.display()
                )
            })?;
        tracing::debug!(root = %root.display(), "found project");
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Discover from `-C DIR` or the current directory.
    pub fn from_cli(dir: Option<&Path>) -> Result<Self> {
        let start = match dir {
            Some(d) => d.to_path_buf(),
            None => std::env::current_dir().context("failed to read current directory")?,
        };
        Self::discover(&start)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(PROJECT_DIR).join(MANIFEST_NAME)
    }

    pub fn lockfile_path(&self) -> PathBuf {
        self.root.join(PROJECT_DIR).join(LOCKFILE_NAME)
    }

    pub fn specs_dir(&self) -> PathBuf {
        self.root.join("specs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("specledger")).unwrap();
        std::fs::write(dir.path().join("specledger/specledger.yaml"), "version: 1.0.0\n").unwrap();
        let nested = dir.path().join("specs/api");
        std::fs::create_dir_all(&nested).unwrap();

        let project = Project::discover(&nested).unwrap();
        assert_eq!(project.root, dir.path());
        assert_eq!(
            project.lockfile_path(),
            dir.path().join("specledger/specledger.sum")
        );
    }

    #[test]
    fn test_discover_fails_outside_project() {
        let dir = tempfile::tempdir().unwrap();
        let err = Project::discover(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not inside a SpecLedger project"));
    }
}
