//! attache-store: persistence for the delivery and job-execution layer.
//!
//! Two storage shapes live here:
//! - whole-document JSON files for run-state and the outbox (read, modify,
//!   write back in full; last writer wins, single writer per job id assumed);
//! - a SQLite database for the event log, chat history, agent sessions and
//!   long-term memories.

mod db;
mod outbox;
mod runstate;

pub use db::{AttacheDb, MemoryStats};
pub use outbox::OutboxStore;
pub use runstate::RunStateStore;

use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Write a JSON document durably: temp file in the same directory, fsync,
/// then atomic rename over the target. A successful return means the document
/// is visible to any other process opening the path.
pub(crate) fn write_document<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = path.with_extension("tmp");
    let bytes = serde_json::to_vec_pretty(value)?;
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a JSON document, or `None` when the file does not exist.
pub(crate) fn read_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(v) => v,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&content)?))
}
