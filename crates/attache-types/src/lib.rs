use serde::{Deserialize, Serialize};

// ──────────────────── Job Types ────────────────────

/// Built-in action a job can run, or `None` for prompt-driven jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobAction {
    /// Check the long-term memory store and report a health summary.
    MemoryHealth,
    /// Scan recent conversation for memory-worthy content.
    ExtractMemories,
    /// Remove agent sessions past the retention window.
    CleanupAgents,
    /// No built-in action; the job carries a prompt instead.
    #[default]
    None,
}

/// A background job definition, loaded from the job list.
///
/// Jobs are defined externally and immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID.
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Whether this job may run.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Built-in action to dispatch on.
    #[serde(default)]
    pub action: JobAction,
    /// Prompt for the reasoning collaborator (prompt-driven jobs only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl Job {
    /// Display label for outbound notifications: the name, or the id when
    /// no name was configured.
    pub fn label(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

fn default_true() -> bool {
    true
}

// ──────────────────── Outbox Types ────────────────────

/// A result handed off for delivery to the user.
///
/// Appended by result producers (the job runner today); consumed and deleted
/// by the external relay process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    /// Producer kind (e.g. "job").
    pub source: String,
    /// Producer-specific ID (job id for job results).
    pub source_id: String,
    /// Human-readable task label.
    pub task: String,
    /// Text to deliver.
    pub result: String,
    /// Destination chat.
    pub chat_id: i64,
    /// Creation time, RFC 3339.
    pub created_at: String,
}

// ──────────────────── Observability Types ────────────────────

/// Severity of an observability event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Debug => "debug",
            EventLevel::Info => "info",
            EventLevel::Warn => "warn",
            EventLevel::Error => "error",
        }
    }
}

/// A structured record for the observability sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub level: EventLevel,
    /// Emitting component (e.g. "delivery", "jobs").
    pub component: String,
    /// Machine-readable event kind (e.g. "send-attempt").
    pub event_type: String,
    /// Human-readable message.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_block_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_artifact_id: Option<String>,
    /// Free-form structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Event {
    pub fn new(
        level: EventLevel,
        component: impl Into<String>,
        event_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            component: component.into(),
            event_type: event_type.into(),
            message: message.into(),
            run_id: None,
            related_block_id: None,
            related_artifact_id: None,
            payload: None,
        }
    }

    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Fire-and-forget observability sink.
///
/// Implementations must never propagate failures to the caller; a sink that
/// cannot record an event logs the problem and drops it.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Sink that discards everything. Useful for tests and tooling paths that
/// do not carry an event log.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

// ──────────────────── Chat History Types ────────────────────

/// One message in the per-chat history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub chat_id: i64,
    /// Author role ("assistant" or "user").
    pub role: String,
    pub text: String,
    /// Unix millis.
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_action_serde_kebab_case() {
        let json = r#""memory-health""#;
        let action: JobAction = serde_json::from_str(json).unwrap();
        assert_eq!(action, JobAction::MemoryHealth);

        let json = serde_json::to_string(&JobAction::CleanupAgents).unwrap();
        assert_eq!(json, "\"cleanup-agents\"");

        let json = serde_json::to_string(&JobAction::None).unwrap();
        assert_eq!(json, "\"none\"");
    }

    #[test]
    fn test_job_defaults() {
        let json = r#"{"id": "daily"}"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert!(job.enabled);
        assert_eq!(job.action, JobAction::None);
        assert!(job.prompt.is_none());
        assert_eq!(job.label(), "daily");
    }

    #[test]
    fn test_job_label_prefers_name() {
        let json = r#"{"id": "daily", "name": "Daily digest"}"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.label(), "Daily digest");
    }

    #[test]
    fn test_outbox_entry_camel_case_wire_format() {
        let entry = OutboxEntry {
            source: "job".into(),
            source_id: "daily".into(),
            task: "Daily digest".into(),
            result: "All quiet.".into(),
            chat_id: 42,
            created_at: "2026-08-08T09:00:00Z".into(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"sourceId\":\"daily\""));
        assert!(json.contains("\"chatId\":42"));
        assert!(json.contains("\"createdAt\""));

        let parsed: OutboxEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_event_builder() {
        let event = Event::new(EventLevel::Warn, "delivery", "send-attempt", "timed out")
            .run_id("run-1")
            .payload(serde_json::json!({"attempt": 2}));
        assert_eq!(event.level.as_str(), "warn");
        assert_eq!(event.run_id.as_deref(), Some("run-1"));
        assert_eq!(event.payload.unwrap()["attempt"], 2);
        assert!(event.related_block_id.is_none());
    }
}
