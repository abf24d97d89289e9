//! Error types.
//!
//! Two layers:
//! - [`EngineError`]: what the container engine said, with engine-specific
//!   shapes (HTTP status codes, transport failures) already normalized.
//! - [`BerthError`]: the caller-facing taxonomy. Each variant maps to exactly
//!   one [`ErrorClass`], which the transport turns into a distinguishable
//!   error code.

use berth_types::TransferDirection;
use thiserror::Error;

/// Normalized container engine failure.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine has no container with this id or name.
    #[error("no such container: {0}")]
    NoSuchContainer(String),

    /// The container exists but is not running (or was already stopped).
    #[error("container not running: {0}")]
    NotRunning(String),

    /// A path named in a copy does not exist inside the container.
    #[error("path not found in container: {0}")]
    PathNotFound(String),

    /// The requested image is not present.
    #[error("image not found: {0}")]
    ImageNotFound(String),

    /// Any other engine-side rejection.
    #[error("engine rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The engine could not be reached or the transport broke mid-call.
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// A command ran but exited non-zero.
    #[error("command exited with code {code}: {stderr}")]
    NonZeroExit { code: i64, stderr: String },

    /// Packing or unpacking a copy archive failed.
    #[error("archive error: {0}")]
    Archive(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Removal outcomes that mean "already gone": treated as success by `remove`.
    pub fn is_benign_absence(&self) -> bool {
        matches!(self, EngineError::NoSuchContainer(_) | EngineError::NotRunning(_))
    }

    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected { status, message: message.into() }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }
}

impl From<bollard::errors::Error> for EngineError {
    fn from(err: bollard::errors::Error) -> Self {
        use bollard::errors::Error as B;

        match err {
            B::DockerResponseServerError { status_code: 404, message } => {
                if message.contains("No such image") || message.contains("pull access denied") {
                    EngineError::ImageNotFound(message)
                } else if message.contains("Could not find the file") {
                    EngineError::PathNotFound(message)
                } else {
                    EngineError::NoSuchContainer(message)
                }
            }
            // 304 Not Modified: stop on an already-stopped container
            B::DockerResponseServerError { status_code: 304, message } => {
                EngineError::NotRunning(message)
            }
            B::DockerResponseServerError { status_code: 409, message }
                if message.contains("is not running") =>
            {
                EngineError::NotRunning(message)
            }
            B::DockerResponseServerError { status_code, message } => {
                EngineError::Rejected { status: status_code, message }
            }
            other => EngineError::Unavailable(other.to_string()),
        }
    }
}

/// Caller-distinguishable error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorClass {
    /// Malformed or missing arguments. Never retried.
    InvalidArguments,
    /// The referenced session does not exist.
    InvalidReference,
    /// The engine or a transfer failed.
    InternalFailure,
}

/// Caller-facing error taxonomy.
#[derive(Debug, Error)]
pub enum BerthError {
    #[error("invalid argument `{field}`: {message}")]
    Validation { field: &'static str, message: String },

    #[error("session not found: {0}")]
    NotFound(String),

    #[error("{op}: {source}")]
    Engine {
        op: &'static str,
        #[source]
        source: EngineError,
    },

    /// The registry stopped accepting work.
    #[error("{op}: server is shutting down")]
    ShuttingDown { op: &'static str },

    #[error("{op}: {direction} transfer {source_path} -> {dest_path} failed: {source}")]
    Transfer {
        op: &'static str,
        direction: TransferDirection,
        source_path: String,
        dest_path: String,
        #[source]
        source: EngineError,
    },
}

impl BerthError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation { field, message: message.into() }
    }

    pub fn not_found(session_id: impl Into<String>) -> Self {
        Self::NotFound(session_id.into())
    }

    /// Wrap an engine failure with the operation that issued it.
    pub fn engine(op: &'static str, source: EngineError) -> Self {
        Self::Engine { op, source }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            BerthError::Validation { .. } => ErrorClass::InvalidArguments,
            BerthError::NotFound(_) => ErrorClass::InvalidReference,
            BerthError::Engine { .. }
            | BerthError::Transfer { .. }
            | BerthError::ShuttingDown { .. } => ErrorClass::InternalFailure,
        }
    }

    /// Offending field for validation errors.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            BerthError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Session id for not-found errors.
    pub fn session_ref(&self) -> Option<&str> {
        match self {
            BerthError::NotFound(id) => Some(id),
            _ => None,
        }
    }
}

pub type BerthResult<T> = Result<T, BerthError>;
