//! Resolved run configuration.

use std::path::PathBuf;

/// Everything a run needs, resolved once from flags and environment and
/// passed down explicitly.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub url: String,
    pub api_key: String,
    pub output_dir: PathBuf,
    pub ignore_file: PathBuf,
    pub commit: bool,
    pub require_empty: bool,
    pub git: bool,
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
