//! Docker engine over bollard.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;

use async_trait::async_trait;
use berth_types::TransferDirection;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, InspectContainerOptions,
    ListContainersOptions, LogOutput, LogsOptions, RemoveContainerOptions, StopContainerOptions,
    UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;

use super::archive;
use super::{ContainerEngine, ContainerSpec, ExecOutput, ManagedContainer};
use crate::config::{MANAGED_LABEL, SESSION_ID_LABEL};
use crate::error::EngineError;

/// Seconds the engine waits for a graceful stop before killing.
const STOP_GRACE_SECS: i64 = 5;
/// Client-side request timeout in seconds.
const CLIENT_TIMEOUT_SECS: u64 = 120;

/// Await `start`; if it fails, await `discard` and return the start error.
async fn start_or_discard<S, D>(container_id: &str, start: S, discard: D) -> Result<(), EngineError>
where
    S: Future<Output = Result<(), EngineError>>,
    D: Future<Output = Result<(), EngineError>>,
{
    let Err(e) = start.await else {
        return Ok(());
    };
    if let Err(cleanup) = discard.await {
        tracing::warn!(container_id, error = %cleanup, "Failed to remove container that did not start");
    }
    Err(e)
}

#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect to `host`, or to the platform default socket when `None`.
    ///
    /// Accepts `unix://` paths, bare socket paths, and `tcp://`/`http://`
    /// addresses. Connecting does not touch the daemon; see [`Self::ping`].
    pub fn connect(host: Option<&str>) -> Result<Self, EngineError> {
        let docker = match host {
            None => Docker::connect_with_local_defaults(),
            Some(h) if h.starts_with("tcp://") || h.starts_with("http://") => {
                let addr = h.replacen("tcp://", "http://", 1);
                Docker::connect_with_http(&addr, CLIENT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
            Some(h) => Docker::connect_with_socket(h, CLIENT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION),
        }
        .map_err(|e| EngineError::unavailable(e.to_string()))?;

        Ok(Self { docker })
    }

    /// Round-trip to the daemon.
    pub async fn ping(&self) -> Result<(), EngineError> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn upload(&self, container_id: &str, source: &str, dest: &str) -> Result<(), EngineError> {
        let (parent, entry_name) = archive::split_container_path(dest)?;
        let source = PathBuf::from(source);
        let tarball = tokio::task::spawn_blocking(move || archive::pack(&source, &entry_name))
            .await
            .map_err(|e| EngineError::archive(e.to_string()))??;

        tracing::debug!(container_id, parent = %parent, bytes = tarball.len(), "Uploading archive");
        self.docker
            .upload_to_container(
                container_id,
                Some(UploadToContainerOptions {
                    path: parent,
                    ..Default::default()
                }),
                tarball.into(),
            )
            .await?;
        Ok(())
    }

    async fn force_remove(&self, container_id: &str) -> Result<(), EngineError> {
        self.docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }

    async fn download(&self, container_id: &str, source: &str, dest: &str) -> Result<(), EngineError> {
        let mut stream = self.docker.download_from_container(
            container_id,
            Some(DownloadFromContainerOptions {
                path: source.to_string(),
            }),
        );

        let mut tarball = Vec::new();
        while let Some(chunk) = stream.next().await {
            tarball.extend_from_slice(&chunk?);
        }
        tracing::debug!(container_id, bytes = tarball.len(), "Downloaded archive");

        let dest = PathBuf::from(dest);
        tokio::task::spawn_blocking(move || archive::unpack(&tarball, &dest))
            .await
            .map_err(|e| EngineError::archive(e.to_string()))??;
        Ok(())
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn create(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let host_config = HostConfig {
            binds: Some(vec![format!("{}:{}:rw", spec.mount_source, spec.mount_target)]),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.cmd.clone()),
            env: Some(spec.env.clone()),
            labels: Some(spec.labels.clone()),
            working_dir: Some(spec.mount_target.clone()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    ..Default::default()
                }),
                config,
            )
            .await?;
        for warning in &response.warnings {
            tracing::warn!(container = %spec.name, %warning, "Engine warning on create");
        }

        // Create and start succeed or fail together.
        start_or_discard(
            &response.id,
            async {
                self.docker
                    .start_container::<String>(&response.id, None)
                    .await
                    .map_err(EngineError::from)
            },
            self.force_remove(&response.id),
        )
        .await?;

        Ok(response.id)
    }

    async fn exec(&self, container_id: &str, cmd: Vec<String>) -> Result<ExecOutput, EngineError> {
        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(cmd),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        match self.docker.start_exec(&exec.id, None).await? {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(frame) = output.next().await {
                    match frame? {
                        LogOutput::StdOut { message } | LogOutput::Console { message } => {
                            stdout.extend_from_slice(&message)
                        }
                        LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
                        LogOutput::StdIn { .. } => {}
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(EngineError::unavailable("exec started detached"));
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: inspect.exit_code.unwrap_or(0),
        })
    }

    async fn copy(
        &self,
        container_id: &str,
        direction: TransferDirection,
        source: &str,
        dest: &str,
    ) -> Result<(), EngineError> {
        match direction {
            TransferDirection::ToContainer => self.upload(container_id, source, dest).await,
            TransferDirection::FromContainer => self.download(container_id, source, dest).await,
        }
    }

    async fn inspect_running(&self, container_id: &str) -> Result<bool, EngineError> {
        let info = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await?;
        Ok(info.state.and_then(|s| s.running).unwrap_or(false))
    }

    async fn logs(&self, container_id: &str, tail: usize) -> Result<String, EngineError> {
        let mut stream = self.docker.logs(
            container_id,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                tail: tail.to_string(),
                ..Default::default()
            }),
        );

        let mut out = String::new();
        while let Some(frame) = stream.next().await {
            out.push_str(&frame?.to_string());
        }
        Ok(out)
    }

    async fn remove(&self, container_id: &str) -> Result<(), EngineError> {
        if let Err(e) = self
            .docker
            .stop_container(container_id, Some(StopContainerOptions { t: STOP_GRACE_SECS }))
            .await
        {
            let e = EngineError::from(e);
            if !e.is_benign_absence() {
                tracing::warn!(container_id, error = %e, "Stop failed, forcing removal");
            }
        }

        self.force_remove(container_id).await
    }

    async fn list_managed(&self) -> Result<Vec<ManagedContainer>, EngineError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![format!("{MANAGED_LABEL}=true")]);

        let summaries = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;

        Ok(summaries
            .into_iter()
            .filter_map(|s| {
                let id = s.id?;
                let name = s
                    .names
                    .and_then(|n| n.into_iter().next())
                    .map(|n| n.trim_start_matches('/').to_string());
                let session_id = s.labels.and_then(|mut l| l.remove(SESSION_ID_LABEL));
                Some(ManagedContainer { id, name, session_id })
            })
            .collect())
    }
}
