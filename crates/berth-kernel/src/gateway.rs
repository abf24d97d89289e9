//! Typed request routing.
//!
//! [`ToolRequest`] is the closed set of operations berth serves. The
//! [`Gateway`] validates a request, resolves its session through the
//! registry, and delegates to the orchestrator with the session's container
//! identity. Gateways never touch session status; only listing does.

use std::path::Path;
use std::sync::Arc;

use berth_types::{Session, SessionId, TransferDirection};

use crate::credentials::CredentialRequest;
use crate::error::{BerthError, BerthResult};
use crate::orchestrator::RemoveOutcome;
use crate::registry::{CreateSession, SessionRegistry};

#[derive(Debug, Clone)]
pub enum ToolRequest {
    CreateSession {
        project_path: String,
        session_name: Option<String>,
        credentials: CredentialRequest,
    },
    ExecuteInSession {
        session_id: String,
        prompt: String,
        /// Empty means the container's default tool set.
        tools: Vec<String>,
    },
    ListSessions,
    DestroySession {
        session_id: String,
    },
    TransferFiles {
        session_id: String,
        direction: TransferDirection,
        source_path: String,
        dest_path: String,
    },
    ExecuteCommand {
        session_id: String,
        command: String,
    },
    GetSessionLogs {
        session_id: String,
        tail: Option<usize>,
    },
}

impl ToolRequest {
    pub fn tool_name(&self) -> &'static str {
        match self {
            ToolRequest::CreateSession { .. } => "create_session",
            ToolRequest::ExecuteInSession { .. } => "execute_in_session",
            ToolRequest::ListSessions => "list_sessions",
            ToolRequest::DestroySession { .. } => "destroy_session",
            ToolRequest::TransferFiles { .. } => "transfer_files",
            ToolRequest::ExecuteCommand { .. } => "execute_command",
            ToolRequest::GetSessionLogs { .. } => "get_session_logs",
        }
    }

    /// The session this request targets, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            ToolRequest::CreateSession { .. } | ToolRequest::ListSessions => None,
            ToolRequest::ExecuteInSession { session_id, .. }
            | ToolRequest::DestroySession { session_id }
            | ToolRequest::TransferFiles { session_id, .. }
            | ToolRequest::ExecuteCommand { session_id, .. }
            | ToolRequest::GetSessionLogs { session_id, .. } => Some(session_id),
        }
    }

    /// Argument checks that need no registry or engine.
    pub fn validate(&self) -> BerthResult<()> {
        if let Some(id) = self.session_id() {
            non_empty("sessionId", id)?;
        }

        match self {
            ToolRequest::CreateSession { project_path, .. } => {
                non_empty("projectPath", project_path)?;
                if !Path::new(project_path).is_absolute() {
                    return Err(BerthError::validation(
                        "projectPath",
                        format!("must be an absolute host path, got {project_path:?}"),
                    ));
                }
            }
            ToolRequest::ExecuteInSession { prompt, tools, .. } => {
                non_empty("prompt", prompt)?;
                if tools.iter().any(|t| t.trim().is_empty()) {
                    return Err(BerthError::validation("tools", "tool names must be non-empty"));
                }
            }
            ToolRequest::TransferFiles {
                source_path,
                dest_path,
                ..
            } => {
                non_empty("sourcePath", source_path)?;
                non_empty("destPath", dest_path)?;
            }
            ToolRequest::ExecuteCommand { command, .. } => non_empty("command", command)?,
            ToolRequest::GetSessionLogs { tail: Some(0), .. } => {
                return Err(BerthError::validation("tail", "must be at least 1"));
            }
            _ => {}
        }
        Ok(())
    }
}

fn non_empty(field: &'static str, value: &str) -> BerthResult<()> {
    if value.trim().is_empty() {
        return Err(BerthError::validation(field, "is required"));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub enum ToolResponse {
    Created(Session),
    AgentOutput {
        session_id: SessionId,
        output: String,
    },
    Sessions(Vec<Session>),
    Destroyed {
        session: Session,
        outcome: RemoveOutcome,
    },
    Transferred {
        session_id: SessionId,
        direction: TransferDirection,
        source_path: String,
        dest_path: String,
    },
    CommandOutput {
        session_id: SessionId,
        output: String,
    },
    Logs {
        session_id: SessionId,
        tail: usize,
        logs: String,
    },
}

#[derive(Clone)]
pub struct Gateway {
    registry: Arc<SessionRegistry>,
}

impl Gateway {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Validate and route one request.
    pub async fn dispatch(&self, request: ToolRequest) -> BerthResult<ToolResponse> {
        request.validate()?;
        let orch = self.registry.orchestrator().clone();

        match request {
            ToolRequest::CreateSession {
                project_path,
                session_name,
                credentials,
            } => {
                let session = self
                    .registry
                    .create(CreateSession {
                        project_path,
                        name: session_name,
                        credentials,
                    })
                    .await?;
                Ok(ToolResponse::Created(session))
            }

            ToolRequest::ExecuteInSession {
                session_id,
                prompt,
                tools,
            } => {
                self.registry
                    .serialized(&session_id, |s| async move {
                        let output = orch
                            .exec_agent(&s.container_id, &prompt, &tools)
                            .await
                            .map_err(|e| BerthError::engine("exec_agent", e))?;
                        Ok(ToolResponse::AgentOutput {
                            session_id: s.id,
                            output,
                        })
                    })
                    .await
            }

            ToolRequest::ListSessions => Ok(ToolResponse::Sessions(self.registry.list().await)),

            ToolRequest::DestroySession { session_id } => {
                let (session, outcome) = self.registry.remove(&session_id).await?;
                Ok(ToolResponse::Destroyed { session, outcome })
            }

            ToolRequest::TransferFiles {
                session_id,
                direction,
                source_path,
                dest_path,
            } => {
                self.registry
                    .serialized(&session_id, |s| async move {
                        match orch
                            .copy(&s.container_id, direction, &source_path, &dest_path)
                            .await
                        {
                            Ok(()) => Ok(ToolResponse::Transferred {
                                session_id: s.id,
                                direction,
                                source_path,
                                dest_path,
                            }),
                            Err(source) => Err(BerthError::Transfer {
                                op: "copy",
                                direction,
                                source_path,
                                dest_path,
                                source,
                            }),
                        }
                    })
                    .await
            }

            ToolRequest::ExecuteCommand {
                session_id,
                command,
            } => {
                self.registry
                    .serialized(&session_id, |s| async move {
                        let output = orch
                            .exec_command(&s.container_id, &command)
                            .await
                            .map_err(|e| BerthError::engine("exec_command", e))?;
                        Ok(ToolResponse::CommandOutput {
                            session_id: s.id,
                            output,
                        })
                    })
                    .await
            }

            ToolRequest::GetSessionLogs { session_id, tail } => {
                let tail = tail.unwrap_or(self.registry.config().default_log_tail);
                self.registry
                    .read_only(&session_id, |s| async move {
                        let logs = orch
                            .get_logs(&s.container_id, Some(tail))
                            .await
                            .map_err(|e| BerthError::engine("get_logs", e))?;
                        Ok(ToolResponse::Logs {
                            session_id: s.id,
                            tail,
                            logs,
                        })
                    })
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BerthConfig;
    use crate::credentials::{CredentialResolver, MapEnv};
    use crate::engine::mock::{EngineCall, MockEngine, MockFailure, MockOp};
    use crate::error::ErrorClass;

    fn setup() -> (Arc<MockEngine>, Gateway) {
        let engine = Arc::new(MockEngine::new());
        let registry = SessionRegistry::new(
            engine.clone(),
            CredentialResolver::new(Arc::new(MapEnv::new())),
            Arc::new(BerthConfig::default()),
        );
        (engine, Gateway::new(Arc::new(registry)))
    }

    async fn create(gw: &Gateway) -> Session {
        match gw
            .dispatch(ToolRequest::CreateSession {
                project_path: "/repo".into(),
                session_name: None,
                credentials: CredentialRequest::default(),
            })
            .await
            .unwrap()
        {
            ToolResponse::Created(s) => s,
            other => panic!("unexpected response: {other:?}"),
        }
    }

    fn session_ops(id: &str) -> Vec<ToolRequest> {
        vec![
            ToolRequest::ExecuteInSession {
                session_id: id.into(),
                prompt: "hi".into(),
                tools: vec![],
            },
            ToolRequest::ExecuteCommand {
                session_id: id.into(),
                command: "ls".into(),
            },
            ToolRequest::TransferFiles {
                session_id: id.into(),
                direction: TransferDirection::ToContainer,
                source_path: "/host/a".into(),
                dest_path: "/ctr/b".into(),
            },
            ToolRequest::GetSessionLogs {
                session_id: id.into(),
                tail: None,
            },
        ]
    }

    #[test]
    fn test_validation_fields() {
        let cases = [
            (
                ToolRequest::CreateSession {
                    project_path: "".into(),
                    session_name: None,
                    credentials: CredentialRequest::default(),
                },
                "projectPath",
            ),
            (
                ToolRequest::CreateSession {
                    project_path: "relative/path".into(),
                    session_name: None,
                    credentials: CredentialRequest::default(),
                },
                "projectPath",
            ),
            (
                ToolRequest::ExecuteInSession {
                    session_id: "".into(),
                    prompt: "x".into(),
                    tools: vec![],
                },
                "sessionId",
            ),
            (
                ToolRequest::ExecuteInSession {
                    session_id: "s".into(),
                    prompt: "  ".into(),
                    tools: vec![],
                },
                "prompt",
            ),
            (
                ToolRequest::ExecuteCommand {
                    session_id: "s".into(),
                    command: "".into(),
                },
                "command",
            ),
            (
                ToolRequest::TransferFiles {
                    session_id: "s".into(),
                    direction: TransferDirection::FromContainer,
                    source_path: "/a".into(),
                    dest_path: "".into(),
                },
                "destPath",
            ),
            (
                ToolRequest::GetSessionLogs {
                    session_id: "s".into(),
                    tail: Some(0),
                },
                "tail",
            ),
        ];

        for (request, field) in cases {
            let err = request.validate().unwrap_err();
            assert_eq!(err.class(), ErrorClass::InvalidArguments, "{request:?}");
            assert_eq!(err.field(), Some(field), "{request:?}");
        }
    }

    #[tokio::test]
    async fn test_unknown_session_performs_no_engine_call() {
        let (engine, gw) = setup();
        let unknown = SessionId::new().to_string();

        for id in ["nope", unknown.as_str()] {
            for request in session_ops(id) {
                let name = request.tool_name();
                let err = gw.dispatch(request).await.unwrap_err();
                assert_eq!(err.class(), ErrorClass::InvalidReference, "{name}");
                assert_eq!(err.session_ref(), Some(id));
            }
        }
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_destroyed_session_performs_no_engine_call() {
        let (engine, gw) = setup();
        let s = create(&gw).await;
        let id = s.id.to_string();
        gw.dispatch(ToolRequest::DestroySession { session_id: id.clone() })
            .await
            .unwrap();
        engine.clear_calls();

        for request in session_ops(&id) {
            let err = gw.dispatch(request).await.unwrap_err();
            assert_eq!(err.class(), ErrorClass::InvalidReference);
        }
        let err = gw
            .dispatch(ToolRequest::DestroySession { session_id: id })
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::InvalidReference);
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_passes_paths_through() {
        let (engine, gw) = setup();
        let s = create(&gw).await;

        let response = gw
            .dispatch(ToolRequest::TransferFiles {
                session_id: s.id.to_string(),
                direction: TransferDirection::ToContainer,
                source_path: "/host/a".into(),
                dest_path: "/ctr/b".into(),
            })
            .await
            .unwrap();
        assert!(matches!(response, ToolResponse::Transferred { .. }));

        let copies = engine.calls_of(MockOp::Copy);
        assert_eq!(
            copies,
            vec![EngineCall::Copy {
                container_id: s.container_id.clone(),
                direction: TransferDirection::ToContainer,
                source: "/host/a".into(),
                dest: "/ctr/b".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_transfer_failure_is_transfer_error() {
        let (engine, gw) = setup();
        let s = create(&gw).await;
        engine.fail_next(MockOp::Copy, MockFailure::Rejected("bad path".into()));

        let err = gw
            .dispatch(ToolRequest::TransferFiles {
                session_id: s.id.to_string(),
                direction: TransferDirection::FromContainer,
                source_path: "/ctr/out".into(),
                dest_path: "/host/in".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BerthError::Transfer { .. }));
        assert_eq!(err.class(), ErrorClass::InternalFailure);
        let msg = err.to_string();
        assert!(msg.contains("/ctr/out") && msg.contains("/host/in"));
    }

    #[tokio::test]
    async fn test_logs_default_tail_is_100() {
        let (engine, gw) = setup();
        let s = create(&gw).await;
        let response = gw
            .dispatch(ToolRequest::GetSessionLogs {
                session_id: s.id.to_string(),
                tail: None,
            })
            .await
            .unwrap();
        assert!(matches!(response, ToolResponse::Logs { tail: 100, .. }));
        assert_eq!(
            engine.calls_of(MockOp::Logs),
            vec![EngineCall::Logs {
                container_id: s.container_id,
                tail: 100,
            }]
        );
    }

    #[tokio::test]
    async fn test_exec_failure_wraps_operation() {
        let (engine, gw) = setup();
        let s = create(&gw).await;
        engine.fail_next(MockOp::Exec, MockFailure::Unavailable);

        let err = gw
            .dispatch(ToolRequest::ExecuteInSession {
                session_id: s.id.to_string(),
                prompt: "hello".into(),
                tools: vec![],
            })
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::InternalFailure);
        assert!(err.to_string().starts_with("exec_agent:"));
    }
}
