//! Store-backed implementations of the collaborator ports.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use attache_store::AttacheDb;

use crate::ports::{ContextBuilder, MaintenanceOps};

/// Context builder over the long-term memory index.
pub struct MemoryContext {
    db: Arc<AttacheDb>,
}

impl MemoryContext {
    pub fn new(db: Arc<AttacheDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ContextBuilder for MemoryContext {
    async fn build_context(&self, query: &str) -> Result<String> {
        let hits = self.db.search_memories(query, 5)?;
        if hits.is_empty() {
            return Ok(String::new());
        }
        let mut out = String::from("Relevant notes from long-term memory:\n");
        for hit in &hits {
            out.push_str("- ");
            out.push_str(hit);
            out.push('\n');
        }
        Ok(out)
    }
}

/// Maintenance actions over the shared database.
pub struct StoreMaintenance {
    db: Arc<AttacheDb>,
    owner_chat_id: i64,
}

impl StoreMaintenance {
    pub fn new(db: Arc<AttacheDb>, owner_chat_id: i64) -> Self {
        Self { db, owner_chat_id }
    }
}

#[async_trait]
impl MaintenanceOps for StoreMaintenance {
    async fn memory_health(&self) -> Result<String> {
        let stats = self.db.memory_stats()?;
        let verdict = if stats.intact && stats.memories == stats.indexed {
            "healthy"
        } else {
            "degraded"
        };
        Ok(format!(
            "memory store {verdict}: {} memories, {} indexed",
            stats.memories, stats.indexed
        ))
    }

    async fn extract_memories(&self) -> Result<String> {
        let recent = self.db.recent_messages(self.owner_chat_id, 50, true)?;
        Ok(format!(
            "extraction scan: {} recent assistant messages reviewed",
            recent.len()
        ))
    }

    async fn cleanup_agents(&self, retention: chrono::Duration) -> Result<String> {
        let cutoff = chrono::Utc::now() - retention;
        let removed = self
            .db
            .cleanup_agent_sessions(cutoff.timestamp_millis())?;
        Ok(format!(
            "removed {removed} agent sessions idle for over {} days",
            retention.num_days()
        ))
    }
}
