//! Append-only handoff of results to the pending-delivery queue.

use std::path::PathBuf;

use attache_types::OutboxEntry;

use crate::{read_document, write_document, Result};

/// JSON-array document of entries awaiting delivery by the external relay.
pub struct OutboxStore {
    path: PathBuf,
}

impl OutboxStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one entry. A successful return means the entry is durably
    /// visible to the relay; there is no buffering in this component, and
    /// write failures propagate to the caller.
    pub fn append(&self, entry: &OutboxEntry) -> Result<()> {
        let mut entries = self.pending()?;
        entries.push(entry.clone());
        write_document(&self.path, &entries)
    }

    /// All entries awaiting delivery, oldest first.
    pub fn pending(&self) -> Result<Vec<OutboxEntry>> {
        Ok(read_document(&self.path)?.unwrap_or_default())
    }

    /// Remove and return all pending entries (relay-side consumption).
    pub fn drain(&self) -> Result<Vec<OutboxEntry>> {
        let entries = self.pending()?;
        if !entries.is_empty() {
            write_document(&self.path, &Vec::<OutboxEntry>::new())?;
        }
        Ok(entries)
    }
}
