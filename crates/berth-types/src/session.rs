//! Session record and its observational status machine.
//!
//! Status is never pushed by the container engine. It is recomputed only when
//! someone asks (`list_sessions`), by feeding the outcome of one engine probe
//! through [`SessionStatus::observe`]. Between queries the stored value is
//! stale by construction.
//!
//! ```text
//!   create ok          observe(probe)            remove ok / benign
//! ───────────► Running ◄──────────────► Stopped ───────────────────► (destroyed)
//!                 ▲  │                   ▲  │
//!                 │  └──────► Error ◄────┘  │
//!                 └──────────────────────────┘
//! ```
//!
//! Destruction is not a status: a destroyed session simply stops existing in
//! the registry.

use serde::{Deserialize, Serialize};

use crate::ids::SessionId;
use crate::runtime::{CredentialSet, RuntimeProfile};

/// Last observed state of a session's container.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
    strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionStatus {
    /// Engine confirmed the container is running.
    Running,
    /// Engine answered, container is not running (or no longer exists).
    Stopped,
    /// Engine could not answer; state unknown.
    Error,
}

/// Outcome of a single engine status query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusProbe {
    /// Engine reports the container running.
    Running,
    /// Engine reports the container present but not running, or absent.
    NotRunning,
    /// The query itself failed. Never interpreted as running.
    Failed(String),
}

impl SessionStatus {
    /// Status of a session whose container creation was just confirmed.
    pub const INITIAL: SessionStatus = SessionStatus::Running;

    /// Transition on one observation.
    ///
    /// Every non-terminal state accepts every probe; the result depends only
    /// on the probe, so repeated listing converges on the engine's view.
    pub fn observe(self, probe: &StatusProbe) -> SessionStatus {
        match probe {
            StatusProbe::Running => SessionStatus::Running,
            StatusProbe::NotRunning => SessionStatus::Stopped,
            StatusProbe::Failed(_) => SessionStatus::Error,
        }
    }
}

/// One logical workspace bound 1:1 to one container.
///
/// Only ever constructed after the engine confirmed container creation, so a
/// stored `Session` always carries a real `container_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    /// Caller-supplied label; defaults to the id.
    pub name: String,
    /// Engine-assigned container identity.
    pub container_id: String,
    /// `prefix + short(id)`.
    pub container_name: String,
    /// Host path mounted into the container. Immutable after creation.
    pub project_path: String,
    /// Unix millis.
    pub created_at: u64,
    pub status: SessionStatus,
    pub runtime: RuntimeProfile,
    /// Resolved credential values. Memory only: never serialized.
    #[serde(skip)]
    pub credentials: CredentialSet,
}

impl Session {
    /// Build the record for a freshly created container.
    pub fn new(
        id: SessionId,
        name: Option<String>,
        container_id: impl Into<String>,
        container_name: impl Into<String>,
        project_path: impl Into<String>,
        runtime: RuntimeProfile,
        credentials: CredentialSet,
    ) -> Self {
        let name = match name {
            Some(n) if !n.trim().is_empty() => n,
            _ => id.to_string(),
        };
        Self {
            id,
            name,
            container_id: container_id.into(),
            container_name: container_name.into(),
            project_path: project_path.into(),
            created_at: crate::now_millis(),
            status: SessionStatus::INITIAL,
            runtime,
            credentials,
        }
    }

    /// Derive the container name for a session id.
    pub fn container_name_for(prefix: &str, id: &SessionId) -> String {
        format!("{prefix}{}", id.short())
    }

    /// Apply one probe outcome, returning the previous status.
    pub fn observe(&mut self, probe: &StatusProbe) -> SessionStatus {
        let previous = self.status;
        self.status = previous.observe(probe);
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Resolved;

    fn session() -> Session {
        Session::new(
            SessionId::new(),
            None,
            "c0ffee",
            "claude-code-abcd1234",
            "/repo",
            RuntimeProfile::Direct,
            CredentialSet::default(),
        )
    }

    #[test]
    fn test_name_defaults_to_id() {
        let s = session();
        assert_eq!(s.name, s.id.to_string());

        let named = Session::new(
            SessionId::new(),
            Some("feature-x".into()),
            "c",
            "n",
            "/p",
            RuntimeProfile::Direct,
            CredentialSet::default(),
        );
        assert_eq!(named.name, "feature-x");
    }

    #[test]
    fn test_blank_name_defaults_to_id() {
        let s = Session::new(
            SessionId::new(),
            Some("   ".into()),
            "c",
            "n",
            "/p",
            RuntimeProfile::Direct,
            CredentialSet::default(),
        );
        assert_eq!(s.name, s.id.to_string());
    }

    #[test]
    fn test_starts_running() {
        let s = session();
        assert_eq!(s.status, SessionStatus::Running);
        assert!(s.created_at > 0);
    }

    #[test]
    fn test_observe_transitions() {
        use SessionStatus::*;
        for from in [Running, Stopped, Error] {
            assert_eq!(from.observe(&StatusProbe::Running), Running);
            assert_eq!(from.observe(&StatusProbe::NotRunning), Stopped);
            assert_eq!(from.observe(&StatusProbe::Failed("boom".into())), Error);
        }
    }

    #[test]
    fn test_observe_returns_previous() {
        let mut s = session();
        let prev = s.observe(&StatusProbe::NotRunning);
        assert_eq!(prev, SessionStatus::Running);
        assert_eq!(s.status, SessionStatus::Stopped);
    }

    #[test]
    fn test_container_name() {
        let id = SessionId::new();
        let name = Session::container_name_for("claude-code-", &id);
        assert_eq!(name, format!("claude-code-{}", id.short()));
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(SessionStatus::Error.to_string(), "error");
        assert_eq!("stopped".parse::<SessionStatus>().unwrap(), SessionStatus::Stopped);
        assert_eq!(serde_json::to_string(&SessionStatus::Running).unwrap(), "\"running\"");
    }

    #[test]
    fn test_json_is_camel_case_and_secret_free() {
        let mut s = session();
        s.credentials.api_key = Resolved::Explicit("sk-secret".into());
        let json = serde_json::to_value(&s).unwrap();
        assert!(json.get("containerId").is_some());
        assert!(json.get("projectPath").is_some());
        assert_eq!(json["status"], "running");
        assert_eq!(json["runtime"], "direct");
        assert!(!json.to_string().contains("sk-secret"));
    }
}
