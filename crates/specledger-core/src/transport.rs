//! Remote repository access.
//!
//! The resolver only sees [`CloneTransport`]; [`GitCliTransport`] is the
//! production implementation and drives the `git` executable.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::manifest::DEFAULT_VERSION;

/// Fetches a repository snapshot at a ref.
#[async_trait]
pub trait CloneTransport: Send + Sync {
    /// Populate `destination` with a snapshot of `url` at `reference` and
    /// return the resolved commit identifier.
    ///
    /// `destination` does not exist yet. On error the transport may leave a
    /// partial directory behind; callers discard it.
    async fn clone_snapshot(
        &self,
        url: &str,
        reference: &str,
        destination: &Path,
        shallow: bool,
    ) -> LedgerResult<String>;
}

/// Clone transport backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCliTransport {
    program: OsString,
    timeout: Option<Duration>,
}

impl Default for GitCliTransport {
    fn default() -> Self {
        Self {
            program: OsString::from("git"),
            timeout: None,
        }
    }
}

impl GitCliTransport {
    /// Transport using `git` from `PATH` with no timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport configured from `SPECLEDGER_CLONE_TIMEOUT` (seconds).
    pub fn from_env() -> LedgerResult<Self> {
        let mut transport = Self::default();
        if let Ok(raw) = std::env::var("SPECLEDGER_CLONE_TIMEOUT") {
            let secs: u64 = raw.trim().parse().map_err(|_| LedgerError::Config {
                message: format!("SPECLEDGER_CLONE_TIMEOUT must be a number of seconds, got {:?}", raw),
            })?;
            if secs > 0 {
                transport.timeout = Some(Duration::from_secs(secs));
            }
        }
        Ok(transport)
    }

    /// Abort clones that take longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use a different `git` executable.
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    /// Configured clone timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn run(&self, args: Vec<OsString>, url: &str, reference: &str) -> LedgerResult<Vec<u8>> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let clone_failed = |message: String| LedgerError::CloneFailed {
            url: url.to_string(),
            reference: reference.to_string(),
            message,
        };

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| clone_failed(format!("timed out after {}s", limit.as_secs())))?,
            None => cmd.output().await,
        }
        .map_err(|e| clone_failed(format!("failed to run git: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(clone_failed(if stderr.is_empty() {
                format!("git exited with {}", output.status)
            } else {
                stderr
            }));
        }

        Ok(output.stdout)
    }
}

fn clone_args(url: &str, reference: &str, destination: &Path, shallow: bool) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["clone".into()];
    if shallow {
        args.push("--depth".into());
        args.push("1".into());
        args.push("--single-branch".into());
    }
    if !reference.is_empty() && reference != DEFAULT_VERSION {
        args.push("--branch".into());
        args.push(reference.into());
    }
    args.push("--".into());
    args.push(url.into());
    args.push(destination.as_os_str().to_owned());
    args
}

#[async_trait]
impl CloneTransport for GitCliTransport {
    async fn clone_snapshot(
        &self,
        url: &str,
        reference: &str,
        destination: &Path,
        shallow: bool,
    ) -> LedgerResult<String> {
        debug!(url, reference, dest = %destination.display(), shallow, "cloning");
        self.run(clone_args(url, reference, destination, shallow), url, reference)
            .await?;

        let rev_parse: Vec<OsString> = vec![
            "-C".into(),
            destination.as_os_str().to_owned(),
            "rev-parse".into(),
            "HEAD".into(),
        ];
        let stdout = self.run(rev_parse, url, reference).await?;
        let commit = String::from_utf8_lossy(&stdout).trim().to_string();
        if commit.is_empty() {
            return Err(LedgerError::CloneFailed {
                url: url.to_string(),
                reference: reference.to_string(),
                message: "git rev-parse returned no commit".to_string(),
            });
        }

        debug!(url, reference, commit = %commit, "cloned");
        Ok(commit)
    }
}
