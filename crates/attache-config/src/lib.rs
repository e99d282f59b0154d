use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use attache_types::Job;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("config directory not found")]
    NoDirFound,
}

/// Settings for the reasoning collaborator (agent CLI subprocess).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Agent CLI binary to spawn.
    #[serde(default = "default_agent_program")]
    pub program: PathBuf,
    /// Maximum reasoning turns per invocation.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Per-invocation timeout in milliseconds.
    #[serde(default = "default_agent_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            program: default_agent_program(),
            max_turns: default_max_turns(),
            timeout_ms: default_agent_timeout_ms(),
        }
    }
}

fn default_agent_program() -> PathBuf {
    PathBuf::from("agent")
}

fn default_max_turns() -> u32 {
    100
}

fn default_agent_timeout_ms() -> u64 {
    600_000
}

/// Top-level attache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttacheConfig {
    /// Telegram bot token.
    #[serde(default)]
    pub bot_token: String,
    /// Chat that owns this assistant; job results are addressed here.
    #[serde(default)]
    pub owner_chat_id: i64,
    /// Directory holding run-state, outbox and the SQLite database.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Path to the job list.
    #[serde(default = "default_jobs_file")]
    pub jobs_file: PathBuf,
    /// Reasoning collaborator settings.
    #[serde(default)]
    pub agent: AgentSettings,
}

impl Default for AttacheConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            owner_chat_id: 0,
            data_dir: default_data_dir(),
            jobs_file: default_jobs_file(),
            agent: AgentSettings::default(),
        }
    }
}

impl AttacheConfig {
    /// Check the settings every outbound-facing command needs.
    ///
    /// Missing credentials are fatal before any work starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_token.trim().is_empty() {
            return Err(ConfigError::Missing("bot_token"));
        }
        if self.owner_chat_id == 0 {
            return Err(ConfigError::Missing("owner_chat_id"));
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    config_dir()
        .map(|d| d.join("data"))
        .unwrap_or_else(|_| PathBuf::from(".attache/data"))
}

fn default_jobs_file() -> PathBuf {
    config_dir()
        .map(|d| d.join("jobs.json5"))
        .unwrap_or_else(|_| PathBuf::from(".attache/jobs.json5"))
}

/// Resolve the attache config directory (~/.attache/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".attache"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.attache/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from the default path, falling back to defaults.
///
/// Environment variables override file values: `ATTACHE_BOT_TOKEN`,
/// `ATTACHE_OWNER_CHAT_ID`, `ATTACHE_DATA_DIR`, `ATTACHE_JOBS_FILE`,
/// `ATTACHE_AGENT_CLI`.
pub fn load_config() -> Result<AttacheConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    let mut config = load_config_from(&path)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<AttacheConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(AttacheConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: AttacheConfig = json5::from_str(&content)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut AttacheConfig) {
    if let Ok(token) = env::var("ATTACHE_BOT_TOKEN") {
        if !token.trim().is_empty() {
            config.bot_token = token;
        }
    }
    if let Some(chat_id) = env::var("ATTACHE_OWNER_CHAT_ID")
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
    {
        config.owner_chat_id = chat_id;
    }
    if let Ok(dir) = env::var("ATTACHE_DATA_DIR") {
        if !dir.trim().is_empty() {
            config.data_dir = PathBuf::from(dir);
        }
    }
    if let Ok(file) = env::var("ATTACHE_JOBS_FILE") {
        if !file.trim().is_empty() {
            config.jobs_file = PathBuf::from(file);
        }
    }
    if let Ok(program) = env::var("ATTACHE_AGENT_CLI") {
        if !program.trim().is_empty() {
            config.agent.program = PathBuf::from(program);
        }
    }
}

/// Load the job list from the given path.
///
/// Returns `None` when the file does not exist; an absent job list is a
/// resolution miss for the runner, not an error.
pub fn load_jobs(path: &Path) -> Result<Option<Vec<Job>>, ConfigError> {
    if !path.exists() {
        tracing::debug!("Job list not found at {}", path.display());
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)?;
    let jobs: Vec<Job> = json5::from_str(&content)?;
    Ok(Some(jobs))
}
