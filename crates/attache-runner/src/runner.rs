//! The job runner: resolve → run → hand off → persist run state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{Local, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use attache_store::{OutboxStore, RunStateStore};
use attache_types::{Event, EventLevel, EventSink, Job, JobAction, OutboxEntry};

use crate::ports::{ContextBuilder, InvokeOptions, MaintenanceOps, Reasoner};

/// Agent sessions older than this are removed by `cleanup-agents`.
const AGENT_RETENTION_DAYS: i64 = 7;
const COMPONENT: &str = "jobs";

/// Limits applied to every reasoning invocation.
#[derive(Debug, Clone)]
pub struct ReasonerDefaults {
    pub max_turns: u32,
    pub timeout: Duration,
}

impl Default for ReasonerDefaults {
    fn default() -> Self {
        Self {
            max_turns: 100,
            timeout: Duration::from_millis(600_000),
        }
    }
}

/// Terminal result of one job invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The action ran to its end; chat-facing output (or a failure notice)
    /// is in the outbox when there was any.
    Completed,
    /// The reasoning collaborator declined to produce output.
    Skipped,
    /// Job list absent, job unknown, or job disabled. Run state untouched.
    NotFound,
}

enum ActionEnd {
    /// Result text handed to the outbox.
    Posted,
    /// Ran fine, nothing chat-facing to deliver.
    Quiet,
    /// Collaborator answered with the skip marker.
    Skipped,
}

/// One-shot executor for a named job.
///
/// Fields are wired once at startup; `run` is called for a single job id and
/// the process exits afterwards. No state is shared between invocations
/// except through the persisted stores.
pub struct JobRunner {
    pub jobs: Option<Vec<Job>>,
    pub run_state: RunStateStore,
    pub outbox: OutboxStore,
    pub events: Arc<dyn EventSink>,
    pub maintenance: Arc<dyn MaintenanceOps>,
    pub context: Arc<dyn ContextBuilder>,
    pub reasoner: Arc<dyn Reasoner>,
    pub owner_chat_id: i64,
    pub defaults: ReasonerDefaults,
}

impl JobRunner {
    /// Run one job by id.
    ///
    /// Errors from the action itself are converted into a best-effort outbox
    /// notice and do not propagate; only a failure to persist run state does.
    pub async fn run(&self, job_id: &str) -> anyhow::Result<RunOutcome> {
        let run_id = Uuid::new_v4().to_string();

        let Some(jobs) = &self.jobs else {
            info!(job_id, "No job list configured, nothing to run");
            return Ok(RunOutcome::NotFound);
        };
        let Some(job) = jobs.iter().find(|j| j.id == job_id) else {
            info!(job_id, "Job not found");
            return Ok(RunOutcome::NotFound);
        };
        if !job.enabled {
            info!(job_id, "Job is disabled, skipping");
            return Ok(RunOutcome::NotFound);
        }

        self.events.emit(
            Event::new(
                EventLevel::Info,
                COMPONENT,
                "job-started",
                format!("running job {}", job.id),
            )
            .run_id(run_id.as_str()),
        );

        let outcome = match self.run_action(job).await {
            Ok(ActionEnd::Posted) => {
                info!(job_id = %job.id, "Job completed, result queued for delivery");
                self.finish_event(&run_id, "job-completed", &job.id);
                RunOutcome::Completed
            }
            Ok(ActionEnd::Quiet) => {
                self.finish_event(&run_id, "job-completed", &job.id);
                RunOutcome::Completed
            }
            Ok(ActionEnd::Skipped) => {
                info!(job_id = %job.id, "Collaborator skipped, nothing to deliver");
                self.finish_event(&run_id, "job-skipped", &job.id);
                RunOutcome::Skipped
            }
            Err(e) => {
                warn!(job_id = %job.id, "Job failed: {e:#}");
                self.events.emit(
                    Event::new(
                        EventLevel::Error,
                        COMPONENT,
                        "job-failed",
                        format!("job {} failed: {e:#}", job.id),
                    )
                    .run_id(run_id.as_str()),
                );
                self.notify_failure(job, &e, &run_id);
                RunOutcome::Completed
            }
        };

        // Every started run records a timestamp, success or not. The only
        // path that skips this is the resolution miss above.
        self.record_run(&job.id)
            .context("failed to persist run state")?;

        Ok(outcome)
    }

    async fn run_action(&self, job: &Job) -> anyhow::Result<ActionEnd> {
        match job.action {
            JobAction::MemoryHealth => {
                let summary = self.maintenance.memory_health().await?;
                info!(job_id = %job.id, "{summary}");
                Ok(ActionEnd::Quiet)
            }
            JobAction::ExtractMemories => {
                let summary = self.maintenance.extract_memories().await?;
                info!(job_id = %job.id, "{summary}");
                Ok(ActionEnd::Quiet)
            }
            JobAction::CleanupAgents => {
                let summary = self
                    .maintenance
                    .cleanup_agents(chrono::Duration::days(AGENT_RETENTION_DAYS))
                    .await?;
                info!(job_id = %job.id, "{summary}");
                Ok(ActionEnd::Quiet)
            }
            JobAction::None => self.run_prompt(job).await,
        }
    }

    async fn run_prompt(&self, job: &Job) -> anyhow::Result<ActionEnd> {
        let Some(prompt) = job.prompt.as_deref() else {
            warn!(job_id = %job.id, "Job has no action and no prompt, nothing to do");
            return Ok(ActionEnd::Quiet);
        };

        let now = Local::now().format("%Y-%m-%d %H:%M");
        let instruction = format!(
            "Scheduled job \"{}\" triggered at {now}.\n\n{prompt}",
            job.id
        );

        let context = self.context.build_context(prompt).await?;
        let opts = InvokeOptions {
            max_turns: self.defaults.max_turns,
            timeout: self.defaults.timeout,
            append_system_prompt: (!context.trim().is_empty()).then_some(context),
            persist_session: false,
        };
        let reply = self.reasoner.invoke(&instruction, &opts).await?;

        if reply.text.trim() == "SKIP" {
            return Ok(ActionEnd::Skipped);
        }

        self.outbox.append(&OutboxEntry {
            source: "job".to_string(),
            source_id: job.id.clone(),
            task: job.label().to_string(),
            result: reply.text,
            chat_id: self.owner_chat_id,
            created_at: Utc::now().to_rfc3339(),
        })?;
        Ok(ActionEnd::Posted)
    }

    /// Best-effort failure notice. A failing write here is logged and
    /// dropped: one level of failure-of-failure handling, no more.
    fn notify_failure(&self, job: &Job, error: &anyhow::Error, run_id: &str) {
        let entry = OutboxEntry {
            source: "job".to_string(),
            source_id: job.id.clone(),
            task: job.label().to_string(),
            result: format!("Job \"{}\" failed: {error:#}", job.label()),
            chat_id: self.owner_chat_id,
            created_at: Utc::now().to_rfc3339(),
        };
        if let Err(write_err) = self.outbox.append(&entry) {
            warn!(job_id = %job.id, "Failed to queue failure notice: {write_err}");
            self.events.emit(
                Event::new(
                    EventLevel::Error,
                    COMPONENT,
                    "outbox-write-failed",
                    format!("failure notice for job {} was lost: {write_err}", job.id),
                )
                .run_id(run_id),
            );
        }
    }

    /// Whole-document read-modify-write; last writer wins. Concurrent
    /// runners for the same job id are assumed not to exist.
    fn record_run(&self, job_id: &str) -> attache_store::Result<()> {
        let mut state = self.run_state.load()?;
        state.insert(job_id.to_string(), Utc::now().timestamp_millis());
        self.run_state.save(&state)
    }

    fn finish_event(&self, run_id: &str, event_type: &str, job_id: &str) {
        self.events.emit(
            Event::new(
                EventLevel::Info,
                COMPONENT,
                event_type,
                format!("job {job_id} finished"),
            )
            .run_id(run_id),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use attache_types::NullSink;

    use crate::ports::Reply;

    struct StaticContext(&'static str);

    #[async_trait]
    impl ContextBuilder for StaticContext {
        async fn build_context(&self, _query: &str) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    /// Reasoner that returns a fixed reply (or error) and captures its input.
    struct ScriptedReasoner {
        reply: Result<String, String>,
        seen: Mutex<Vec<(String, InvokeOptions)>>,
    }

    impl ScriptedReasoner {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Reasoner for ScriptedReasoner {
        async fn invoke(&self, prompt: &str, opts: &InvokeOptions) -> anyhow::Result<Reply> {
            self.seen
                .lock()
                .unwrap()
                .push((prompt.to_string(), opts.clone()));
            match &self.reply {
                Ok(text) => Ok(Reply { text: text.clone() }),
                Err(message) => Err(anyhow::anyhow!("{message}")),
            }
        }
    }

    struct CountingMaintenance {
        cleanups: Mutex<u32>,
    }

    #[async_trait]
    impl MaintenanceOps for CountingMaintenance {
        async fn memory_health(&self) -> anyhow::Result<String> {
            Ok("memory store healthy: 0 memories, 0 indexed".to_string())
        }

        async fn extract_memories(&self) -> anyhow::Result<String> {
            Ok("extraction scan: 0 recent assistant messages reviewed".to_string())
        }

        async fn cleanup_agents(&self, retention: chrono::Duration) -> anyhow::Result<String> {
            *self.cleanups.lock().unwrap() += 1;
            Ok(format!(
                "removed 0 agent sessions idle for over {} days",
                retention.num_days()
            ))
        }
    }

    fn runner(dir: &Path, jobs: Option<Vec<Job>>, reasoner: Arc<ScriptedReasoner>) -> JobRunner {
        JobRunner {
            jobs,
            run_state: RunStateStore::new(dir.join("run-state.json")),
            outbox: OutboxStore::new(dir.join("outbox.json")),
            events: Arc::new(NullSink),
            maintenance: Arc::new(CountingMaintenance {
                cleanups: Mutex::new(0),
            }),
            context: Arc::new(StaticContext("")),
            reasoner,
            owner_chat_id: 42,
            defaults: ReasonerDefaults::default(),
        }
    }

    fn prompt_job(id: &str) -> Job {
        Job {
            id: id.to_string(),
            name: String::new(),
            enabled: true,
            action: JobAction::None,
            prompt: Some("Summarize the day.".to_string()),
        }
    }

    #[tokio::test]
    async fn test_disabled_job_leaves_run_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = prompt_job("daily");
        job.enabled = false;
        let r = runner(dir.path(), Some(vec![job]), ScriptedReasoner::ok("hi"));

        let outcome = r.run("daily").await.unwrap();
        assert_eq!(outcome, RunOutcome::NotFound);
        assert!(r.run_state.load().unwrap().is_empty());
        assert!(r.outbox.pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_absent_job_list_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let r = runner(dir.path(), None, ScriptedReasoner::ok("hi"));
        assert_eq!(r.run("daily").await.unwrap(), RunOutcome::NotFound);
        assert!(r.run_state.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_job_posts_result_to_outbox() {
        let dir = tempfile::tempdir().unwrap();
        let reasoner = ScriptedReasoner::ok("Here is the digest.");
        let r = runner(dir.path(), Some(vec![prompt_job("daily")]), reasoner.clone());

        let started = Utc::now().timestamp_millis();
        let outcome = r.run("daily").await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed);

        let pending = r.outbox.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].source, "job");
        assert_eq!(pending[0].source_id, "daily");
        assert_eq!(pending[0].task, "daily");
        assert_eq!(pending[0].result, "Here is the digest.");
        assert_eq!(pending[0].chat_id, 42);

        let state = r.run_state.load().unwrap();
        assert!(state["daily"] >= started);
    }

    #[tokio::test]
    async fn test_prompt_job_builds_instruction_and_options() {
        let dir = tempfile::tempdir().unwrap();
        let reasoner = ScriptedReasoner::ok("ok");
        let mut r = runner(dir.path(), Some(vec![prompt_job("daily")]), reasoner.clone());
        r.context = Arc::new(StaticContext("Owner likes short answers.\n"));

        r.run("daily").await.unwrap();

        let seen = reasoner.seen.lock().unwrap();
        let (prompt, opts) = &seen[0];
        assert!(prompt.starts_with("Scheduled job \"daily\" triggered at "));
        assert!(prompt.ends_with("Summarize the day."));
        assert_eq!(opts.max_turns, 100);
        assert_eq!(opts.timeout, Duration::from_millis(600_000));
        assert!(!opts.persist_session);
        assert_eq!(
            opts.append_system_prompt.as_deref(),
            Some("Owner likes short answers.\n")
        );
    }

    #[tokio::test]
    async fn test_skip_reply_updates_state_without_outbox_entry() {
        let dir = tempfile::tempdir().unwrap();
        let r = runner(
            dir.path(),
            Some(vec![prompt_job("daily")]),
            ScriptedReasoner::ok("  SKIP\n"),
        );

        let outcome = r.run("daily").await.unwrap();
        assert_eq!(outcome, RunOutcome::Skipped);
        assert!(r.outbox.pending().unwrap().is_empty());
        assert!(r.run_state.load().unwrap().contains_key("daily"));
    }

    #[tokio::test]
    async fn test_failing_action_queues_failure_notice() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = prompt_job("daily");
        job.name = "Daily digest".to_string();
        let r = runner(
            dir.path(),
            Some(vec![job]),
            ScriptedReasoner::failing("model exploded"),
        );

        let started = Utc::now().timestamp_millis();
        let outcome = r.run("daily").await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed);

        let pending = r.outbox.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].source, "job");
        assert!(pending[0]
            .result
            .starts_with("Job \"Daily digest\" failed: "));
        assert!(pending[0].result.contains("model exploded"));

        assert!(r.run_state.load().unwrap()["daily"] >= started);
    }

    #[tokio::test]
    async fn test_cleanup_job_runs_quietly_and_advances_state() {
        let dir = tempfile::tempdir().unwrap();
        let job = Job {
            id: "tidy".to_string(),
            name: String::new(),
            enabled: true,
            action: JobAction::CleanupAgents,
            prompt: None,
        };
        let reasoner = ScriptedReasoner::ok("unused");
        let r = runner(dir.path(), Some(vec![job]), reasoner.clone());

        assert_eq!(r.run("tidy").await.unwrap(), RunOutcome::Completed);
        let first = r.run_state.load().unwrap()["tidy"];

        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(r.run("tidy").await.unwrap(), RunOutcome::Completed);
        let second = r.run_state.load().unwrap()["tidy"];

        assert!(second > first);
        assert!(r.outbox.pending().unwrap().is_empty());
        // The reasoner is never consulted for built-in actions.
        assert!(reasoner.seen.lock().unwrap().is_empty());
    }
}
