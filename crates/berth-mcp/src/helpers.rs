//! Response rendering and error mapping.

use berth_kernel::{BerthError, ErrorClass, RemoveOutcome, Session, ToolResponse};
use rmcp::ErrorData as McpError;
use rmcp::model::{CallToolResult, Content};
use serde_json::json;

/// Render a gateway response as tool output.
pub fn render(response: ToolResponse) -> CallToolResult {
    let text = match response {
        ToolResponse::Created(session) => created_json(&session).to_string(),
        ToolResponse::AgentOutput { output, .. } | ToolResponse::CommandOutput { output, .. } => output,
        ToolResponse::Sessions(sessions) => json!({
            "sessions": sessions,
            "count": sessions.len(),
        })
        .to_string(),
        ToolResponse::Destroyed { session, outcome } => match outcome {
            RemoveOutcome::Removed => format!(
                "Session {} destroyed (container {} removed)",
                session.id, session.container_name
            ),
            RemoveOutcome::AlreadyGone => format!(
                "Session {} cleaned up (container {} was already gone)",
                session.id, session.container_name
            ),
        },
        ToolResponse::Transferred {
            session_id,
            direction,
            source_path,
            dest_path,
        } => format!("Transferred {source_path} -> {dest_path} ({direction}) in session {session_id}"),
        ToolResponse::Logs { logs, .. } => logs,
    };
    CallToolResult::success(vec![Content::text(text)])
}

/// `create_session` result: identity plus the echoed, secret-free config.
fn created_json(session: &Session) -> serde_json::Value {
    json!({
        "sessionId": session.id,
        "containerName": session.container_name,
        "containerId": session.container_id,
        "status": session.status,
        "config": {
            "name": session.name,
            "projectPath": session.project_path,
            "runtime": session.runtime,
            "credentials": session.credentials.summary(),
        },
    })
}

/// Map a berth error onto a distinguishable MCP error.
pub fn to_mcp_error(tool: &str, err: &BerthError) -> McpError {
    let message = format!("Tool {tool} failed: {err}");
    match err.class() {
        ErrorClass::InvalidArguments => McpError::invalid_params(
            message,
            Some(json!({ "kind": ErrorClass::InvalidArguments.as_ref(), "field": err.field() })),
        ),
        ErrorClass::InvalidReference => McpError::invalid_params(
            message,
            Some(json!({ "kind": ErrorClass::InvalidReference.as_ref(), "sessionId": err.session_ref() })),
        ),
        ErrorClass::InternalFailure => McpError::internal_error(
            message,
            Some(json!({ "kind": ErrorClass::InternalFailure.as_ref() })),
        ),
    }
}
