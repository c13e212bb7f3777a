//! Git operations for the export directory.
//!
//! Everything goes through the `GitOps` trait so the synchronizer can be
//! driven by a mock in tests. `RealGit` shells out to the `git` binary.

use std::path::Path;
use std::process::{Command, Output};

use thiserror::Error;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

/// Errors that can occur during git operations.
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Git command failed: {0}")]
    CommandFailed(String),

    #[error("Git command returned non-zero exit code {code}: {output}")]
    NonZeroExit { code: i32, output: String },

    #[error("Git not installed or not in PATH")]
    GitNotFound,
}

/// Trait for git operations. Can be mocked in tests.
///
/// Paths handed to and returned from these methods are relative to the
/// repository root `path`.
#[cfg_attr(test, automock)]
pub trait GitOps {
    /// Initialize a git repository at the given path.
    fn init(&self, path: &Path) -> Result<(), GitError>;

    /// Read a repository-local config value, `None` when unset.
    fn config_get(&self, path: &Path, key: &str) -> Result<Option<String>, GitError>;

    /// Set a repository-local config value.
    fn config_set(&self, path: &Path, key: &str, value: &str) -> Result<(), GitError>;

    /// Remove a repository-local config value.
    fn config_unset(&self, path: &Path, key: &str) -> Result<(), GitError>;

    /// Add files to the staging area.
    fn add_files(&self, path: &Path, files: &[String]) -> Result<(), GitError>;

    /// Remove files from the index and the working tree.
    fn remove_files(&self, path: &Path, files: &[String]) -> Result<(), GitError>;

    /// List tracked files.
    fn ls_files(&self, path: &Path) -> Result<Vec<String>, GitError>;

    /// True if the index differs from HEAD.
    fn has_staged_changes(&self, path: &Path) -> Result<bool, GitError>;

    /// Create a commit with the given message.
    fn commit(&self, path: &Path, message: &str) -> Result<(), GitError>;
}

/// Real implementation of GitOps using std::process::Command.
#[derive(Clone, Copy, Default)]
pub struct RealGit;

impl RealGit {
    pub fn new() -> Self {
        Self
    }

    fn run_git(&self, path: &Path, args: &[&str]) -> Result<Output, GitError> {
        debug!(dir = %path.display(), ?args, "git");
        Command::new("git")
            .args(args)
            .current_dir(path)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    GitError::GitNotFound
                } else {
                    GitError::CommandFailed(e.to_string())
                }
            })
    }

    fn check_output(&self, output: Output) -> Result<Output, GitError> {
        if output.status.success() {
            return Ok(output);
        }

        let code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let combined = match (stdout.is_empty(), stderr.is_empty()) {
            (false, false) => format!("{}\n{}", stdout, stderr),
            (false, true) => stdout,
            _ => stderr,
        };
        Err(GitError::NonZeroExit {
            code,
            output: combined,
        })
    }

    fn run_checked(&self, path: &Path, args: &[&str]) -> Result<Output, GitError> {
        let output = self.run_git(path, args)?;
        self.check_output(output)
    }

    /// Run `git <command> [flags] -- <files>`.
    fn run_with_paths(
        &self,
        path: &Path,
        command: &[&str],
        files: &[String],
    ) -> Result<(), GitError> {
        let mut args: Vec<&str> = command.to_vec();
        args.push("--");
        args.extend(files.iter().map(String::as_str));
        self.run_checked(path, &args)?;
        Ok(())
    }
}

impl GitOps for RealGit {
    fn init(&self, path: &Path) -> Result<(), GitError> {
        self.run_checked(path, &["init", "--quiet"])?;
        Ok(())
    }

    fn config_get(&self, path: &Path, key: &str) -> Result<Option<String>, GitError> {
        let output = self.run_git(path, &["config", "--local", "--get", key])?;
        // Exit code 1 means the key is not set.
        if output.status.code() == Some(1) {
            return Ok(None);
        }
        let output = self.check_output(output)?;
        Ok(Some(
            String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
        ))
    }

    fn config_set(&self, path: &Path, key: &str, value: &str) -> Result<(), GitError> {
        self.run_checked(path, &["config", "--local", key, value])?;
        Ok(())
    }

    fn config_unset(&self, path: &Path, key: &str) -> Result<(), GitError> {
        let output = self.run_git(path, &["config", "--local", "--unset", key])?;
        // Exit code 5 means there was nothing to unset.
        if output.status.code() == Some(5) {
            return Ok(());
        }
        self.check_output(output)?;
        Ok(())
    }

    fn add_files(&self, path: &Path, files: &[String]) -> Result<(), GitError> {
        self.run_with_paths(path, &["add"], files)
    }

    fn remove_files(&self, path: &Path, files: &[String]) -> Result<(), GitError> {
        // Forced: a stale file may be staged but uncommitted, or edited locally.
        self.run_with_paths(path, &["rm", "-f", "--quiet"], files)
    }

    fn ls_files(&self, path: &Path) -> Result<Vec<String>, GitError> {
        // NUL-separated output is never quoted, whatever core.quotepath says.
        let output = self.run_checked(path, &["ls-files", "-z"])?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .split('\0')
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn has_staged_changes(&self, path: &Path) -> Result<bool, GitError> {
        let output = self.run_checked(path, &["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    fn commit(&self, path: &Path, message: &str) -> Result<(), GitError> {
        self.run_checked(path, &["commit", "--quiet", "-m", message])?;
        Ok(())
    }
}

/// Scoped override of a repository config value.
///
/// The previous value is put back (or the key unset, if it had none) when
/// the guard is dropped, including on early returns and `?` exits.
pub struct ConfigOverride<'a, G: GitOps> {
    git: &'a G,
    repo: &'a Path,
    key: &'a str,
    previous: Option<String>,
}

impl<'a, G: GitOps> ConfigOverride<'a, G> {
    pub fn apply(git: &'a G, repo: &'a Path, key: &'a str, value: &str) -> Result<Self, GitError> {
        let previous = git.config_get(repo, key)?;
        git.config_set(repo, key, value)?;
        debug!(key, value, ?previous, "config override applied");
        Ok(Self {
            git,
            repo,
            key,
            previous,
        })
    }
}

impl<G: GitOps> Drop for ConfigOverride<'_, G> {
    fn drop(&mut self) {
        let restored = match &self.previous {
            Some(value) => self.git.config_set(self.repo, self.key, value),
            None => self.git.config_unset(self.repo, self.key),
        };
        if let Err(e) = restored {
            warn!(key = self.key, error = %e, "failed to restore git config");
        }
    }
}
