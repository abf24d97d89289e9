//! MCP server for berth sessions.
//!
//! Exposes the session registry as seven tools: create, execute, list,
//! destroy, transfer, command and logs. Each tool translates its arguments
//! into a [`ToolRequest`], dispatches it through the kernel [`Gateway`] and
//! renders the [`ToolResponse`](berth_kernel::ToolResponse).
//!
//! Errors come back as MCP errors whose `data.kind` is one of
//! `invalid_arguments`, `invalid_reference` or `internal_failure`.
//!
//! ## Module Structure
//!
//! - `models`: Request types for MCP tools
//! - `helpers`: Response rendering and error mapping

mod helpers;
mod models;

use std::sync::Arc;

use berth_kernel::{Gateway, SessionRegistry, ToolRequest};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};

pub use helpers::{render, to_mcp_error};
pub use models::*;

/// MCP server over a [`SessionRegistry`].
#[derive(Clone)]
pub struct BerthMcp {
    gateway: Gateway,
    tool_router: ToolRouter<Self>,
}

impl std::fmt::Debug for BerthMcp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BerthMcp")
            .field("sessions", &self.gateway.registry().len())
            .field("tool_router", &self.tool_router)
            .finish()
    }
}

impl BerthMcp {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            gateway: Gateway::new(registry),
            tool_router: Self::tool_router(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.gateway.registry()
    }

    async fn call(&self, request: ToolRequest) -> Result<CallToolResult, McpError> {
        let tool = request.tool_name();
        match self.gateway.dispatch(request).await {
            Ok(response) => Ok(render(response)),
            Err(e) => {
                tracing::warn!(tool, class = %e.class(), error = %e, "Tool failed");
                Err(to_mcp_error(tool, &e))
            }
        }
    }
}

#[tool_router]
impl BerthMcp {
    #[tool(description = "Create an isolated session: starts a container with the project directory mounted as its workspace and the agent's credentials in its environment. Returns the session id used by every other tool.")]
    #[tracing::instrument(skip(self, req), name = "tool.create_session")]
    pub async fn create_session(
        &self,
        Parameters(req): Parameters<CreateSessionRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.call(req.into()).await
    }

    #[tool(description = "Run the agent non-interactively inside a session with a prompt and return its output. An empty tool list keeps the container's default allowed tools.")]
    #[tracing::instrument(skip(self, req), name = "tool.execute_in_session", fields(session = %req.session_id))]
    pub async fn execute_in_session(
        &self,
        Parameters(req): Parameters<ExecuteInSessionRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.call(ToolRequest::ExecuteInSession {
            session_id: req.session_id,
            prompt: req.prompt,
            tools: req.tools,
        })
        .await
    }

    #[tool(description = "List all sessions with their status refreshed from the container engine (running, stopped or error).")]
    #[tracing::instrument(skip(self), name = "tool.list_sessions")]
    pub async fn list_sessions(&self) -> Result<CallToolResult, McpError> {
        self.call(ToolRequest::ListSessions).await
    }

    #[tool(description = "Destroy a session and remove its container. Succeeds if the container is already gone.")]
    #[tracing::instrument(skip(self, req), name = "tool.destroy_session", fields(session = %req.session_id))]
    pub async fn destroy_session(
        &self,
        Parameters(req): Parameters<SessionIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.call(ToolRequest::DestroySession {
            session_id: req.session_id,
        })
        .await
    }

    #[tool(description = "Copy a file or directory between the host and a session container. direction is to_container or from_container and says which side sourcePath is on.")]
    #[tracing::instrument(skip(self, req), name = "tool.transfer_files", fields(session = %req.session_id))]
    pub async fn transfer_files(
        &self,
        Parameters(req): Parameters<TransferFilesRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.call(ToolRequest::TransferFiles {
            session_id: req.session_id,
            direction: req.direction,
            source_path: req.source_path,
            dest_path: req.dest_path,
        })
        .await
    }

    #[tool(description = "Run a shell command inside a session's workspace and return its output.")]
    #[tracing::instrument(skip(self, req), name = "tool.execute_command", fields(session = %req.session_id))]
    pub async fn execute_command(
        &self,
        Parameters(req): Parameters<ExecuteCommandRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.call(ToolRequest::ExecuteCommand {
            session_id: req.session_id,
            command: req.command,
        })
        .await
    }

    #[tool(description = "Return the last lines of a session container's logs (default 100).")]
    #[tracing::instrument(skip(self, req), name = "tool.get_session_logs", fields(session = %req.session_id))]
    pub async fn get_session_logs(
        &self,
        Parameters(req): Parameters<GetSessionLogsRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.call(ToolRequest::GetSessionLogs {
            session_id: req.session_id,
            tail: req.tail,
        })
        .await
    }
}

#[tool_handler]
impl ServerHandler for BerthMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_server_info(Implementation::new("berth", env!("CARGO_PKG_VERSION")))
            .with_instructions(
                "Berth runs agents in isolated container sessions. Call create_session with an absolute projectPath, then use the returned sessionId with execute_in_session, execute_command, transfer_files and get_session_logs. list_sessions refreshes status; destroy_session removes the container.",
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_kernel::{
        BerthConfig, BerthError, CredentialResolver, EngineError, ErrorClass, MapEnv, MockEngine,
    };
    use rmcp::model::ErrorCode;

    #[test]
    fn test_server_info_names_berth_with_tools_only() {
        let registry = SessionRegistry::new(
            Arc::new(MockEngine::new()),
            CredentialResolver::new(Arc::new(MapEnv::new())),
            Arc::new(BerthConfig::default()),
        );
        let info = BerthMcp::new(Arc::new(registry)).get_info();

        assert_eq!(info.server_info.name, "berth");
        assert_eq!(info.server_info.version, env!("CARGO_PKG_VERSION"));
        assert!(info.capabilities.tools.is_some());
        assert!(info.capabilities.resources.is_none());
        assert!(info.instructions.unwrap().contains("create_session"));
    }

    #[test]
    fn test_error_classes_are_distinguishable() {
        let invalid = to_mcp_error("execute_command", &BerthError::validation("command", "is required"));
        let missing = to_mcp_error("destroy_session", &BerthError::not_found("nope"));
        let internal = to_mcp_error(
            "execute_in_session",
            &BerthError::engine("exec_agent", EngineError::unavailable("socket closed")),
        );

        assert_eq!(invalid.code, ErrorCode::INVALID_PARAMS);
        assert_eq!(missing.code, ErrorCode::INVALID_PARAMS);
        assert_eq!(internal.code, ErrorCode::INTERNAL_ERROR);

        let kind = |e: &McpError| e.data.as_ref().unwrap()["kind"].clone();
        assert_eq!(kind(&invalid), "invalid_arguments");
        assert_eq!(kind(&missing), "invalid_reference");
        assert_eq!(kind(&internal), "internal_failure");

        assert_eq!(invalid.data.as_ref().unwrap()["field"], "command");
        assert_eq!(missing.data.as_ref().unwrap()["sessionId"], "nope");
    }

    #[test]
    fn test_error_message_names_tool_and_operation() {
        let err = to_mcp_error(
            "execute_in_session",
            &BerthError::engine("exec_agent", EngineError::NonZeroExit { code: 2, stderr: "boom".into() }),
        );
        assert!(err.message.starts_with("Tool execute_in_session failed: exec_agent:"));
        assert!(err.message.contains("boom"));
        assert_eq!(ErrorClass::InternalFailure.as_ref(), "internal_failure");
    }
}
