//! MCP request types.
//!
//! Field names are camelCase on the wire.

use berth_kernel::{CredentialRequest, ToolRequest, TransferDirection};
use rmcp::schemars;
use serde::Deserialize;

/// Create a session container for a project.
#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[schemars(description = "Absolute host path mounted read-write as the container workspace")]
    pub project_path: String,
    #[schemars(description = "Human-readable session label (defaults to the session id)")]
    pub session_name: Option<String>,
    #[schemars(description = "Anthropic API key for the direct runtime profile")]
    pub api_key: Option<String>,
    /// Cloud-hosted model profile
    #[schemars(description = "Use the cloud-hosted (Bedrock) model profile; unset AWS fields fall back to this server's environment")]
    #[serde(default)]
    pub use_bedrock: bool,
    #[schemars(description = "AWS region for the cloud profile")]
    pub aws_region: Option<String>,
    #[schemars(description = "AWS access key id for the cloud profile")]
    pub aws_access_key_id: Option<String>,
    #[schemars(description = "AWS secret access key for the cloud profile")]
    pub aws_secret_access_key: Option<String>,
    #[schemars(description = "AWS session token for the cloud profile")]
    pub aws_session_token: Option<String>,
    #[schemars(description = "Primary model identifier for the cloud profile")]
    pub bedrock_model: Option<String>,
    #[schemars(description = "Small/fast model identifier for the cloud profile")]
    pub bedrock_small_model: Option<String>,
}

impl From<CreateSessionRequest> for ToolRequest {
    fn from(req: CreateSessionRequest) -> Self {
        ToolRequest::CreateSession {
            project_path: req.project_path,
            session_name: req.session_name,
            credentials: CredentialRequest {
                use_cloud: req.use_bedrock,
                api_key: req.api_key,
                aws_region: req.aws_region,
                aws_access_key_id: req.aws_access_key_id,
                aws_secret_access_key: req.aws_secret_access_key,
                aws_session_token: req.aws_session_token,
                model: req.bedrock_model,
                small_model: req.bedrock_small_model,
            },
        }
    }
}

/// Run the agent inside a session.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteInSessionRequest {
    #[schemars(description = "Session id returned by create_session")]
    pub session_id: String,
    #[schemars(description = "Prompt passed to the agent")]
    pub prompt: String,
    #[schemars(description = "Tools the agent may use; omit or leave empty for the container default")]
    #[serde(default, alias = "toolAllowlist")]
    pub tools: Vec<String>,
}

/// Reference a session by id.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdRequest {
    #[schemars(description = "Session id returned by create_session")]
    pub session_id: String,
}

/// Copy files between the host and a session container.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferFilesRequest {
    #[schemars(description = "Session id returned by create_session")]
    pub session_id: String,
    #[schemars(description = "to_container: sourcePath is on the host; from_container: sourcePath is in the container")]
    pub direction: TransferDirection,
    #[schemars(description = "Path to copy from (file or directory)")]
    pub source_path: String,
    #[schemars(description = "Path to copy to; its basename names the copy")]
    pub dest_path: String,
}

/// Run a shell command inside a session.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteCommandRequest {
    #[schemars(description = "Session id returned by create_session")]
    pub session_id: String,
    #[schemars(description = "Command run with `sh -c` in the workspace directory")]
    pub command: String,
}

/// Fetch a session container's logs.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetSessionLogsRequest {
    #[schemars(description = "Session id returned by create_session")]
    pub session_id: String,
    #[schemars(description = "Number of trailing lines to return (default: 100)")]
    pub tail: Option<usize>,
}
