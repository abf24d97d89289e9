//! Container engine seam.
//!
//! [`ContainerEngine`] is the complete set of primitives berth consumes from
//! the engine. Everything above it (naming, env, agent command lines, benign
//! removal, fail-closed probing) lives in [`crate::orchestrator`], so engines
//! stay thin translations of their API.

mod archive;
mod docker;
#[cfg(any(test, feature = "test-mock"))]
pub mod mock;

use std::collections::HashMap;

use async_trait::async_trait;
use berth_types::TransferDirection;

use crate::error::EngineError;

pub use docker::DockerEngine;

/// Everything needed to create and start one session container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Host path bind-mounted read-write.
    pub mount_source: String,
    /// Mount target inside the container; also the working directory.
    pub mount_target: String,
    /// `KEY=value` pairs. May carry secrets; never log.
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    /// Main process. Must stay alive so execs can attach.
    pub cmd: Vec<String>,
}

/// Captured result of one exec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

impl ExecOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Default::default()
        }
    }
}

/// A berth-labelled container found at the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedContainer {
    pub id: String,
    pub name: Option<String>,
    pub session_id: Option<String>,
}

/// Container engine primitives.
///
/// All operations are independent I/O calls; none of them knows about
/// sessions.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Create and start a container, returning its engine id.
    async fn create(&self, spec: &ContainerSpec) -> Result<String, EngineError>;

    /// Run `cmd` inside the container and capture its output.
    async fn exec(&self, container_id: &str, cmd: Vec<String>) -> Result<ExecOutput, EngineError>;

    /// Copy `source` to `dest`; `direction` says which side `source` is on.
    async fn copy(
        &self,
        container_id: &str,
        direction: TransferDirection,
        source: &str,
        dest: &str,
    ) -> Result<(), EngineError>;

    /// Whether the container is running. `NoSuchContainer` if absent.
    async fn inspect_running(&self, container_id: &str) -> Result<bool, EngineError>;

    /// Last `tail` lines of combined stdout/stderr.
    async fn logs(&self, container_id: &str, tail: usize) -> Result<String, EngineError>;

    /// Stop and remove the container.
    async fn remove(&self, container_id: &str) -> Result<(), EngineError>;

    /// Containers carrying the berth managed label, running or not.
    async fn list_managed(&self) -> Result<Vec<ManagedContainer>, EngineError>;
}
