//! Interactive commit message entry.

use std::env;
use std::fs;
use std::process::Command;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

const FALLBACK_EDITOR: &str = "vi";

/// Source of commit messages.
#[cfg_attr(test, automock)]
pub trait MessageSource {
    fn collect_message(&self) -> Result<String>;
}

/// Opens the user's editor on a scratch file and returns what was saved.
pub struct EditorPrompt {
    editor: String,
}

impl EditorPrompt {
    pub fn new(editor: impl Into<String>) -> Self {
        Self {
            editor: editor.into(),
        }
    }

    /// Use `$EDITOR`, or `vi` when it is unset or empty.
    pub fn from_env() -> Self {
        let editor = env::var("EDITOR")
            .ok()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_EDITOR.to_string());
        Self::new(editor)
    }
}

impl MessageSource for EditorPrompt {
    /// Blocks until the editor exits. The scratch file is deleted when this
    /// returns, whether or not it succeeded. Content is returned verbatim,
    /// so an untouched file yields an empty message.
    fn collect_message(&self) -> Result<String> {
        let file = NamedTempFile::new().context("Failed to create commit message file")?;
        debug!(editor = %self.editor, path = %file.path().display(), "opening editor");

        // Run through the shell like git does, so `EDITOR="code --wait"` works.
        let status = Command::new("sh")
            .arg("-c")
            .arg(format!("{} \"$@\"", self.editor))
            .arg(&self.editor)
            .arg(file.path())
            .status()
            .with_context(|| format!("Failed to launch editor `{}`", self.editor))?;

        if !status.success() {
            anyhow::bail!("Editor `{}` exited with {}", self.editor, status);
        }

        fs::read_to_string(file.path()).context("Failed to read commit message")
    }
}
