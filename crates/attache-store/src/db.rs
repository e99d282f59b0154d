//! SQLite database: event log, chat history, agent sessions, memories.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use attache_types::{ChatMessage, Event, EventLevel, EventSink};

use crate::Result;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ts INTEGER NOT NULL,
        level TEXT NOT NULL,
        component TEXT NOT NULL,
        event_type TEXT NOT NULL,
        message TEXT NOT NULL,
        run_id TEXT,
        related_block_id TEXT,
        related_artifact_id TEXT,
        payload TEXT
    );

    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        chat_id INTEGER NOT NULL,
        role TEXT NOT NULL,
        text TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS agent_sessions (
        id TEXT PRIMARY KEY,
        agent TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        last_active_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS memories (
        id TEXT PRIMARY KEY,
        content TEXT NOT NULL,
        source TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
        content, id UNINDEXED
    );";

/// Counts reported by the memory health check.
#[derive(Debug, Clone, Copy)]
pub struct MemoryStats {
    pub memories: u64,
    pub indexed: u64,
    /// Result of `PRAGMA integrity_check`.
    pub intact: bool,
}

/// Shared SQLite store for everything row-shaped.
pub struct AttacheDb {
    conn: Mutex<Connection>,
}

impl AttacheDb {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("Database opened: {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ─── Event Log ───────────────────────────────────

    /// Append an event to the log.
    pub fn log_event(&self, event: &Event) -> Result<()> {
        let payload = event
            .payload
            .as_ref()
            .map(|p| p.to_string());
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO events (ts, level, component, event_type, message, run_id, related_block_id, related_artifact_id, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                chrono::Utc::now().timestamp_millis(),
                event.level.as_str(),
                event.component,
                event.event_type,
                event.message,
                event.run_id,
                event.related_block_id,
                event.related_artifact_id,
                payload,
            ],
        )?;
        Ok(())
    }

    /// Most recent events, newest first.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<Event>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT level, component, event_type, message, run_id, related_block_id, related_artifact_id, payload
             FROM events ORDER BY id DESC LIMIT ?1",
        )?;
        let events = stmt
            .query_map(rusqlite::params![limit as i64], |row| {
                Ok(Event {
                    level: parse_level(&row.get::<_, String>(0)?),
                    component: row.get(1)?,
                    event_type: row.get(2)?,
                    message: row.get(3)?,
                    run_id: row.get(4)?,
                    related_block_id: row.get(5)?,
                    related_artifact_id: row.get(6)?,
                    payload: row
                        .get::<_, Option<String>>(7)?
                        .and_then(|s| serde_json::from_str(&s).ok()),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    // ─── Chat History ───────────────────────────────────

    /// Record one message in the per-chat history.
    pub fn log_message(&self, chat_id: i64, role: &str, text: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO messages (chat_id, role, text, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![chat_id, role, text, chrono::Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    /// Recent messages for a chat, oldest first.
    pub fn recent_messages(
        &self,
        chat_id: i64,
        limit: usize,
        assistant_only: bool,
    ) -> Result<Vec<ChatMessage>> {
        let conn = self.conn.lock().unwrap();
        let sql = if assistant_only {
            "SELECT chat_id, role, text, created_at FROM messages
             WHERE chat_id = ?1 AND role = 'assistant'
             ORDER BY id DESC LIMIT ?2"
        } else {
            "SELECT chat_id, role, text, created_at FROM messages
             WHERE chat_id = ?1
             ORDER BY id DESC LIMIT ?2"
        };
        let mut stmt = conn.prepare(sql)?;
        let mut messages = stmt
            .query_map(rusqlite::params![chat_id, limit as i64], |row| {
                Ok(ChatMessage {
                    chat_id: row.get(0)?,
                    role: row.get(1)?,
                    text: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    // ─── Agent Sessions ───────────────────────────────────

    /// Insert or refresh an agent session record.
    pub fn upsert_agent_session(&self, id: &str, agent: &str, last_active_at: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO agent_sessions (id, agent, created_at, last_active_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(id) DO UPDATE SET last_active_at = excluded.last_active_at",
            rusqlite::params![id, agent, last_active_at],
        )?;
        Ok(())
    }

    /// Delete agent sessions whose last activity is before the cutoff.
    pub fn cleanup_agent_sessions(&self, cutoff_ms: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM agent_sessions WHERE last_active_at < ?1",
            rusqlite::params![cutoff_ms],
        )?;
        Ok(removed)
    }

    // ─── Memories ───────────────────────────────────

    /// Store a memory and index it for full-text search.
    pub fn insert_memory(&self, content: &str, source: &str) -> Result<()> {
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO memories (id, content, source, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, content, source, chrono::Utc::now().timestamp_millis()],
        )?;
        conn.execute(
            "INSERT INTO memories_fts (content, id) VALUES (?1, ?2)",
            rusqlite::params![content, id],
        )?;
        Ok(())
    }

    /// Full-text search over stored memories, best matches first.
    pub fn search_memories(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let Some(match_expr) = fts_match_expr(query) else {
            return Ok(Vec::new());
        };
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT content FROM memories_fts WHERE memories_fts MATCH ?1 ORDER BY rank LIMIT ?2",
        )?;
        let results = stmt
            .query_map(rusqlite::params![match_expr, limit as i64], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(results)
    }

    /// Row counts + integrity check for the memory health report.
    pub fn memory_stats(&self) -> Result<MemoryStats> {
        let conn = self.conn.lock().unwrap();
        let memories: u64 =
            conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        let indexed: u64 =
            conn.query_row("SELECT COUNT(*) FROM memories_fts", [], |row| row.get(0))?;
        let verdict: String =
            conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(MemoryStats {
            memories,
            indexed,
            intact: verdict == "ok",
        })
    }
}

impl EventSink for AttacheDb {
    fn emit(&self, event: Event) {
        if let Err(e) = self.log_event(&event) {
            tracing::warn!("event log write failed: {e}");
        }
    }
}

fn parse_level(s: &str) -> EventLevel {
    match s {
        "debug" => EventLevel::Debug,
        "warn" => EventLevel::Warn,
        "error" => EventLevel::Error,
        _ => EventLevel::Info,
    }
}

/// Build an FTS5 MATCH expression from free text: quoted terms ORed together.
/// Returns `None` for queries with no searchable terms.
fn fts_match_expr(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| t.replace('"', ""))
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}
