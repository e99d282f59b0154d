//! attache-runner: the job execution contract.
//!
//! A job runs exactly once per invocation: resolve it from the job list,
//! dispatch its action, hand results (or a failure notice) to the outbox,
//! and persist the last-run timestamp whatever happened.

pub mod agent;
pub mod collaborators;
pub mod ports;
pub mod runner;

pub use agent::AgentCli;
pub use collaborators::{MemoryContext, StoreMaintenance};
pub use ports::{ContextBuilder, InvokeOptions, MaintenanceOps, Reasoner, Reply};
pub use runner::{JobRunner, ReasonerDefaults, RunOutcome};
