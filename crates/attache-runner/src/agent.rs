//! Reasoning collaborator backed by an agent CLI subprocess.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::process::Command;

use crate::ports::{InvokeOptions, Reasoner, Reply};

/// One-shot agent CLI invocation with JSON output.
///
/// The CLI contract: `<program> -p <prompt> --output-format json
/// --max-turns <n> [--append-system-prompt <text>] [--continue]`, printing a
/// single JSON object with `result` text and an `is_error` flag on stdout.
pub struct AgentCli {
    program: PathBuf,
}

impl AgentCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Reasoner for AgentCli {
    async fn invoke(&self, prompt: &str, opts: &InvokeOptions) -> anyhow::Result<Reply> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-p")
            .arg(prompt)
            .arg("--output-format")
            .arg("json")
            .arg("--max-turns")
            .arg(opts.max_turns.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if opts.persist_session {
            cmd.arg("--continue");
        }
        if let Some(extra) = &opts.append_system_prompt {
            cmd.arg("--append-system-prompt").arg(extra);
        }

        let child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program.display()))?;

        // kill_on_drop reaps the child when the timeout wins the race.
        let output = match tokio::time::timeout(opts.timeout, child.wait_with_output()).await {
            Ok(result) => result.context("agent process failed")?,
            Err(_) => bail!("agent invocation timed out after {:?}", opts.timeout),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("agent exited with {}: {}", output.status, stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let value: serde_json::Value =
            serde_json::from_str(stdout.trim()).context("agent output was not valid JSON")?;

        if value
            .get("is_error")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
        {
            bail!(
                "agent reported an error: {}",
                value
                    .get("result")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
            );
        }

        let text = value
            .get("result")
            .and_then(|v| v.as_str())
            .context("agent output missing result text")?
            .to_string();
        Ok(Reply { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn opts() -> InvokeOptions {
        InvokeOptions {
            max_turns: 3,
            timeout: Duration::from_secs(5),
            append_system_prompt: None,
            persist_session: false,
        }
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_error() {
        let agent = AgentCli::new("/nonexistent/agent-binary");
        let err = agent.invoke("hi", &opts()).await.unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_parses_json_result() {
        use std::os::unix::fs::PermissionsExt;

        // A stand-in "agent" script that ignores its arguments and prints a
        // fixed JSON result.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("agent.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\nprintf '{\"result\": \"hello from agent\", \"is_error\": false}'\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let agent = AgentCli::new(&script);
        let reply = agent.invoke("hi", &opts()).await.unwrap();
        assert_eq!(reply.text, "hello from agent");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_error_flag_is_an_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("agent.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\nprintf '{\"result\": \"turn limit exceeded\", \"is_error\": true}'\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let agent = AgentCli::new(&script);
        let err = agent.invoke("hi", &opts()).await.unwrap_err();
        assert!(err.to_string().contains("turn limit exceeded"));
    }
}
