//! # berth-kernel
//!
//! Session lifecycle manager and container-orchestration adapter.
//!
//! The only stateful part of berth. It maps a logical session identity to a
//! concrete container, resolves credentials for that container's agent, and
//! serializes the engine operations issued against each session.
//!
//! ```text
//! ToolRequest ──► Gateway::dispatch
//!                    │
//!                    ├── SessionRegistry (id → slot, per-session op lock)
//!                    │        │
//!                    │        └── CredentialResolver (explicit > ambient > unset)
//!                    │
//!                    └── Orchestrator (uniform create/exec/copy/probe/logs/remove)
//!                             │
//!                             └── dyn ContainerEngine ──► DockerEngine (bollard)
//!                                                    └──► MockEngine (tests)
//! ```

pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod registry;

pub use config::{BerthConfig, ConfigError, ShutdownPolicy};
pub use credentials::{AmbientSource, CredentialRequest, CredentialResolver, MapEnv, ProcessEnv};
pub use engine::{ContainerEngine, ContainerSpec, DockerEngine, ExecOutput, ManagedContainer};
pub use error::{BerthError, BerthResult, EngineError, ErrorClass};
pub use gateway::{Gateway, ToolRequest, ToolResponse};
pub use orchestrator::{Orchestrator, RemoveOutcome};
pub use registry::{CreateSession, ReconcileReport, SessionRegistry};

#[cfg(any(test, feature = "test-mock"))]
pub use engine::mock::{EngineCall, MockEngine, MockFailure, MockOp};

pub use berth_types::{
    CredentialSet, Resolved, RuntimeProfile, Session, SessionId, SessionStatus, StatusProbe,
    TransferDirection,
};
