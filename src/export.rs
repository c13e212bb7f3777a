//! Write fetched queries to `.sql` files.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::models::QueryRecord;

/// Write each record's query text to `output_dir/{id}_{name}.sql`.
///
/// Creates `output_dir` if needed and overwrites existing files. Returns the
/// written file names relative to `output_dir`, in record order.
pub fn write_queries(records: &[QueryRecord], output_dir: &Path) -> Result<Vec<String>> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let mut written = Vec::with_capacity(records.len());
    for record in records {
        let file_name = record.file_name();
        let path = output_dir.join(&file_name);
        fs::write(&path, &record.query)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(id = record.id, file = %file_name, "wrote query");
        written.push(file_name);
    }

    info!(count = written.len(), dir = %output_dir.display(), "wrote query files");
    Ok(written)
}

/// True if `dir` exists and has at least one entry.
pub fn is_non_empty_dir(dir: &Path) -> Result<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    let mut entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
    Ok(entries.next().is_some())
}
