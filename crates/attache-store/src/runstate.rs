//! Whole-document store for per-job last-run timestamps.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::{read_document, write_document, Result};

/// Persistent map of job id → last-run epoch milliseconds.
///
/// The document is read and written in full. Concurrent runners for the same
/// job id are assumed not to exist; runners for different job ids can race
/// the read-modify-write and lose one update, so callers serialize
/// invocations or accept that.
pub struct RunStateStore {
    path: PathBuf,
}

impl RunStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the current map; an absent file is an empty map.
    pub fn load(&self) -> Result<HashMap<String, i64>> {
        Ok(read_document(&self.path)?.unwrap_or_default())
    }

    /// Overwrite the whole document.
    pub fn save(&self, state: &HashMap<String, i64>) -> Result<()> {
        write_document(&self.path, state)
    }
}
