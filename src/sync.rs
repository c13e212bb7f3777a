//! Keep the export directory's git history in step with the latest export.
//!
//! One `sync` run opens (or initializes) the repository in the output
//! directory, stages the freshly written query files, drops top-level files
//! that no longer correspond to a query, and commits when asked to and there
//! is something to commit. Paths in the ignore set are never staged or
//! removed.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::editor::MessageSource;
use crate::git::{ConfigOverride, GitOps};
use crate::ignores::IgnoreSet;

const QUOTEPATH_KEY: &str = "core.quotepath";
const QUOTEPATH_VALUE: &str = "true";

/// What a sync run ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Index matches HEAD; no commit was attempted.
    NothingToDo,
    /// Changes are staged but a commit was not requested.
    Staged,
    /// Changes were committed.
    Committed,
}

/// Summary of a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub staged: Vec<String>,
    pub removed: Vec<String>,
}

/// Files to stage: everything written, minus ignored paths.
pub fn files_to_stage(written: &[String], ignores: &IgnoreSet) -> Vec<String> {
    written
        .iter()
        .filter(|file| !ignores.contains(*file))
        .cloned()
        .collect()
}

/// Tracked top-level files that were not written this run and are not ignored.
///
/// Anything below a subdirectory is left alone.
pub fn stale_files(tracked: &[String], written: &[String], ignores: &IgnoreSet) -> Vec<String> {
    let written: BTreeSet<&str> = written.iter().map(String::as_str).collect();
    tracked
        .iter()
        .filter(|file| !file.contains('/'))
        .filter(|file| !written.contains(file.as_str()))
        .filter(|file| !ignores.contains(*file))
        .cloned()
        .collect()
}

/// Drives the git side of an export.
pub struct Synchronizer<G: GitOps, M: MessageSource> {
    git: G,
    messages: M,
}

impl<G: GitOps, M: MessageSource> Synchronizer<G, M> {
    pub fn new(git: G, messages: M) -> Self {
        Self { git, messages }
    }

    /// Stage, prune and optionally commit `written` in `output_dir`.
    ///
    /// The commit message is only asked for when there is a staged diff and
    /// `should_commit` is set.
    pub fn sync(
        &self,
        output_dir: &Path,
        written: &[String],
        ignores: &IgnoreSet,
        should_commit: bool,
    ) -> Result<SyncReport> {
        self.open_or_init(output_dir)?;

        let _quotepath =
            ConfigOverride::apply(&self.git, output_dir, QUOTEPATH_KEY, QUOTEPATH_VALUE)
                .context("Failed to override core.quotepath")?;

        let staged = files_to_stage(written, ignores);
        if !staged.is_empty() {
            self.git
                .add_files(output_dir, &staged)
                .context("Failed to stage query files")?;
        }

        let tracked = self
            .git
            .ls_files(output_dir)
            .context("Failed to list tracked files")?;
        let removed = stale_files(&tracked, written, ignores);
        if !removed.is_empty() {
            info!(count = removed.len(), "removing stale query files");
            self.git
                .remove_files(output_dir, &removed)
                .context("Failed to remove stale query files")?;
        }

        let has_diff = self
            .git
            .has_staged_changes(output_dir)
            .context("Failed to check for staged changes")?;

        let outcome = if !has_diff {
            info!("no staged changes");
            SyncOutcome::NothingToDo
        } else if !should_commit {
            info!("changes staged, commit not requested");
            SyncOutcome::Staged
        } else {
            let message = self.messages.collect_message()?;
            self.git
                .commit(output_dir, &message)
                .context("Failed to commit")?;
            info!("committed");
            SyncOutcome::Committed
        };

        Ok(SyncReport {
            outcome,
            staged,
            removed,
        })
    }

    fn open_or_init(&self, output_dir: &Path) -> Result<()> {
        if output_dir.join(".git").is_dir() {
            info!(dir = %output_dir.display(), "opening existing repository");
            return Ok(());
        }

        info!(dir = %output_dir.display(), "initializing repository");
        self.git
            .init(output_dir)
            .with_context(|| {
                format!(
                    "Failed to initialize git repository in {}",
                    output_dir.display()
                )
            })
    }
}
