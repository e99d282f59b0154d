//! Ports to the external collaborators the runner calls.

use std::time::Duration;

use async_trait::async_trait;

/// Options for one reasoning invocation.
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    /// Maximum reasoning turns before the collaborator must stop.
    pub max_turns: u32,
    /// Wall-clock budget for the whole invocation.
    pub timeout: Duration,
    /// Extra system instruction appended to the collaborator's own.
    pub append_system_prompt: Option<String>,
    /// Carry conversational state across invocations. Job runs never do.
    pub persist_session: bool,
}

/// Output of a reasoning invocation.
#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
}

/// The reasoning collaborator.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn invoke(&self, prompt: &str, opts: &InvokeOptions) -> anyhow::Result<Reply>;
}

/// Builds supplementary context for a reasoning call.
#[async_trait]
pub trait ContextBuilder: Send + Sync {
    async fn build_context(&self, query: &str) -> anyhow::Result<String>;
}

/// Built-in maintenance actions. Each returns a one-line summary for the log;
/// none of them produce chat-facing output.
#[async_trait]
pub trait MaintenanceOps: Send + Sync {
    async fn memory_health(&self) -> anyhow::Result<String>;
    async fn extract_memories(&self) -> anyhow::Result<String>;
    async fn cleanup_agents(&self, retention: chrono::Duration) -> anyhow::Result<String>;
}
