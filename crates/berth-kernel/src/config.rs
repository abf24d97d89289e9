//! Server configuration.
//!
//! Loaded from `~/.config/berth/config.ron` (or an explicit path). Every field
//! has a default, so a partial file only overrides what it names:
//!
//! ```ron
//! (
//!     image: "claude-code-container:latest",
//!     container_prefix: "claude-code-",
//!     shutdown: Disown,
//!     reap_orphans: true,
//! )
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label marking containers created by berth.
pub const MANAGED_LABEL: &str = "berth.managed";
/// Label carrying the owning session id.
pub const SESSION_ID_LABEL: &str = "berth.session-id";
/// Label carrying the session's display name.
pub const SESSION_NAME_LABEL: &str = "berth.session-name";

/// What happens to tracked containers when the registry shuts down.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
    strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ShutdownPolicy {
    /// Remove every tracked container.
    #[default]
    Destroy,
    /// Leave containers running; only forget them.
    Disown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BerthConfig {
    /// Image every session container is created from.
    pub image: String,
    /// Container name prefix; the name is `prefix + short(id)`.
    pub container_prefix: String,
    /// Mount target (and working directory) of the project path.
    pub workspace_dir: String,
    /// Agent executable inside the container.
    pub agent_command: String,
    /// Lines returned by `get_session_logs` when no tail is given.
    pub default_log_tail: usize,
    /// Engine endpoint (`unix:///var/run/docker.sock`, `tcp://host:2375`).
    /// `None` uses the platform defaults.
    pub docker_host: Option<String>,
    pub shutdown: ShutdownPolicy,
    /// Remove berth-labelled containers left behind by earlier processes.
    pub reap_orphans: bool,
    /// Extra labels added to every container.
    pub extra_labels: HashMap<String, String>,
}

impl Default for BerthConfig {
    fn default() -> Self {
        Self {
            image: "claude-code-container:latest".to_string(),
            container_prefix: "claude-code-".to_string(),
            workspace_dir: "/workspace".to_string(),
            agent_command: "claude".to_string(),
            default_log_tail: 100,
            docker_host: None,
            shutdown: ShutdownPolicy::Destroy,
            reap_orphans: false,
            extra_labels: HashMap::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
}

impl BerthConfig {
    /// Default config file path (`~/.config/berth/config.ron`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("berth").join("config.ron"))
    }

    /// Parse a RON document.
    pub fn from_ron(text: &str, path: &Path) -> Result<Self, ConfigError> {
        ron::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path`, or from the default location.
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => {
                    tracing::debug!("No config directory available, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !required && !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_ron(&text, &path)?;
        tracing::info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Labels stamped on a session's container.
    pub fn labels_for(&self, session_id: &str, session_name: &str) -> HashMap<String, String> {
        let mut labels = self.extra_labels.clone();
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
        labels.insert(SESSION_ID_LABEL.to_string(), session_id.to_string());
        labels.insert(SESSION_NAME_LABEL.to_string(), session_name.to_string());
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BerthConfig::default();
        assert_eq!(config.default_log_tail, 100);
        assert_eq!(config.container_prefix, "claude-code-");
        assert_eq!(config.shutdown, ShutdownPolicy::Destroy);
        assert!(!config.reap_orphans);
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config = BerthConfig::from_ron(
            r#"(image: "custom:dev", shutdown: Disown)"#,
            Path::new("inline.ron"),
        )
        .unwrap();
        assert_eq!(config.image, "custom:dev");
        assert_eq!(config.shutdown, ShutdownPolicy::Disown);
        assert_eq!(config.workspace_dir, "/workspace");
    }

    #[test]
    fn test_malformed_ron_is_error() {
        let err = BerthConfig::from_ron("(image: ", Path::new("bad.ron")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.ron"));
    }

    #[test]
    fn test_load_explicit_missing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = BerthConfig::load(Some(&dir.path().join("absent.ron"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ron");
        std::fs::write(&path, "(default_log_tail: 25, reap_orphans: true)").unwrap();
        let config = BerthConfig::load(Some(&path)).unwrap();
        assert_eq!(config.default_log_tail, 25);
        assert!(config.reap_orphans);
    }

    #[test]
    fn test_shutdown_policy_parse() {
        assert_eq!("disown".parse::<ShutdownPolicy>().unwrap(), ShutdownPolicy::Disown);
        assert_eq!("Destroy".parse::<ShutdownPolicy>().unwrap(), ShutdownPolicy::Destroy);
        assert!("keep".parse::<ShutdownPolicy>().is_err());
    }

    #[test]
    fn test_labels() {
        let mut config = BerthConfig::default();
        config.extra_labels.insert("team".into(), "infra".into());
        let labels = config.labels_for("id-1", "demo");
        assert_eq!(labels[MANAGED_LABEL], "true");
        assert_eq!(labels[SESSION_ID_LABEL], "id-1");
        assert_eq!(labels[SESSION_NAME_LABEL], "demo");
        assert_eq!(labels["team"], "infra");
    }
}
