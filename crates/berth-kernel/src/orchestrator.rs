//! Container orchestrator.
//!
//! Uniform operations over a [`ContainerEngine`]: the session-facing
//! contract (create, exec, copy, status, logs, remove) with berth's naming,
//! environment, command lines and error policy applied. Engine-specific error
//! shapes are already normalized into [`EngineError`] by the engine.

use std::sync::Arc;

use berth_types::{CredentialSet, SessionId, StatusProbe, TransferDirection};

use crate::config::BerthConfig;
use crate::credentials::container_env;
use crate::engine::{ContainerEngine, ContainerSpec, ManagedContainer};
use crate::error::EngineError;

/// Main process of every session container. Keeps it alive for execs.
const IDLE_CMD: [&str; 2] = ["sleep", "infinity"];

/// Result of an idempotent remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RemoveOutcome {
    /// The engine removed the container.
    Removed,
    /// The engine reported the container already absent or stopped.
    AlreadyGone,
}

#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<dyn ContainerEngine>,
    config: Arc<BerthConfig>,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: Arc<BerthConfig>) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &BerthConfig {
        &self.config
    }

    /// Create and start a session container with `mount_path` bound at the
    /// workspace directory and the resolved credentials in its environment.
    #[tracing::instrument(skip(self, credentials), name = "engine.create", fields(session = %session_id))]
    pub async fn create_container(
        &self,
        mount_path: &str,
        container_name: &str,
        session_id: &SessionId,
        session_name: &str,
        credentials: &CredentialSet,
    ) -> Result<String, EngineError> {
        let spec = ContainerSpec {
            name: container_name.to_string(),
            image: self.config.image.clone(),
            mount_source: mount_path.to_string(),
            mount_target: self.config.workspace_dir.clone(),
            env: container_env(credentials),
            labels: self.config.labels_for(&session_id.to_string(), session_name),
            cmd: IDLE_CMD.iter().map(|s| s.to_string()).collect(),
        };

        let container_id = self.engine.create(&spec).await?;
        tracing::info!(container = %container_id, name = container_name, "Container started");
        Ok(container_id)
    }

    /// Run the agent non-interactively and return its stdout.
    ///
    /// An empty allowlist leaves the container's default tool set in place.
    #[tracing::instrument(skip(self, prompt), name = "engine.exec_agent", fields(container = %container_id))]
    pub async fn exec_agent(
        &self,
        container_id: &str,
        prompt: &str,
        tool_allowlist: &[String],
    ) -> Result<String, EngineError> {
        self.run(container_id, self.agent_cmd(prompt, tool_allowlist)).await
    }

    /// Run a shell command and return its stdout.
    #[tracing::instrument(skip(self, command), name = "engine.exec_command", fields(container = %container_id))]
    pub async fn exec_command(&self, container_id: &str, command: &str) -> Result<String, EngineError> {
        let cmd = vec!["sh".to_string(), "-c".to_string(), command.to_string()];
        self.run(container_id, cmd).await
    }

    fn agent_cmd(&self, prompt: &str, tool_allowlist: &[String]) -> Vec<String> {
        let mut cmd = vec![
            self.config.agent_command.clone(),
            "--print".to_string(),
            prompt.to_string(),
        ];
        if !tool_allowlist.is_empty() {
            cmd.push("--allowedTools".to_string());
            cmd.push(tool_allowlist.join(","));
        }
        cmd
    }

    async fn run(&self, container_id: &str, cmd: Vec<String>) -> Result<String, EngineError> {
        let output = self.engine.exec(container_id, cmd).await?;
        if output.exit_code != 0 {
            tracing::debug!(exit_code = output.exit_code, "Exec exited non-zero");
            return Err(EngineError::NonZeroExit {
                code: output.exit_code,
                stderr: output.stderr,
            });
        }
        Ok(output.stdout)
    }

    #[tracing::instrument(skip(self), name = "engine.copy", fields(container = %container_id))]
    pub async fn copy(
        &self,
        container_id: &str,
        direction: TransferDirection,
        source_path: &str,
        dest_path: &str,
    ) -> Result<(), EngineError> {
        self.engine
            .copy(container_id, direction, source_path, dest_path)
            .await
    }

    /// Whether the container is running. An absent container is not running;
    /// any other engine failure is returned to the caller.
    pub async fn is_running(&self, container_id: &str) -> Result<bool, EngineError> {
        match self.engine.inspect_running(container_id).await {
            Ok(running) => Ok(running),
            Err(EngineError::NoSuchContainer(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Fail-closed status probe: a failed query is `Failed`, never running.
    #[tracing::instrument(skip(self), name = "probe.status", fields(container = %container_id))]
    pub async fn probe(&self, container_id: &str) -> StatusProbe {
        match self.is_running(container_id).await {
            Ok(true) => StatusProbe::Running,
            Ok(false) => StatusProbe::NotRunning,
            Err(e) => {
                tracing::warn!(error = %e, "Status probe failed");
                StatusProbe::Failed(e.to_string())
            }
        }
    }

    /// Last `tail` log lines, or the configured default.
    #[tracing::instrument(skip(self), name = "engine.logs", fields(container = %container_id))]
    pub async fn get_logs(&self, container_id: &str, tail: Option<usize>) -> Result<String, EngineError> {
        let tail = tail.unwrap_or(self.config.default_log_tail);
        self.engine.logs(container_id, tail).await
    }

    /// Idempotent remove. Already-absent and already-stopped are success.
    #[tracing::instrument(skip(self), name = "engine.remove", fields(container = %container_id))]
    pub async fn remove(&self, container_id: &str) -> Result<RemoveOutcome, EngineError> {
        match self.engine.remove(container_id).await {
            Ok(()) => Ok(RemoveOutcome::Removed),
            Err(e) if e.is_benign_absence() => {
                tracing::info!(reason = %e, "Container already gone");
                Ok(RemoveOutcome::AlreadyGone)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn list_managed(&self) -> Result<Vec<ManagedContainer>, EngineError> {
        self.engine.list_managed().await
    }
}
