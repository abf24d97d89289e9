//! Credential resolution for session runtime profiles.
//!
//! Precedence per field: explicit request value > ambient process value >
//! unset. Ambient values are only consulted for the cloud profile. The
//! resolver never fails and never invents a value: a session may be created
//! with no usable credential, and the agent reports that at execution time.
//!
//! Ambient lookup goes through [`AmbientSource`] so tests can assert
//! precedence with a [`MapEnv`] instead of mutating the process environment.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use berth_types::{CredentialSet, Resolved};

pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const USE_BEDROCK: &str = "CLAUDE_CODE_USE_BEDROCK";
pub const AWS_REGION: &str = "AWS_REGION";
pub const AWS_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const AWS_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
pub const ANTHROPIC_MODEL: &str = "ANTHROPIC_MODEL";
pub const ANTHROPIC_SMALL_FAST_MODEL: &str = "ANTHROPIC_SMALL_FAST_MODEL";

/// Source of process-level ambient credentials.
pub trait AmbientSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// The real process environment. Empty values count as absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl AmbientSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

/// Fixed key/value ambient source.
#[derive(Debug, Clone, Default)]
pub struct MapEnv(HashMap<String, String>);

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

impl AmbientSource for MapEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).filter(|v| !v.is_empty()).cloned()
    }
}

/// Credential fields as supplied on a create request.
#[derive(Clone, Default)]
pub struct CredentialRequest {
    pub use_cloud: bool,
    pub api_key: Option<String>,
    pub aws_region: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_session_token: Option<String>,
    pub model: Option<String>,
    pub small_model: Option<String>,
}

impl fmt::Debug for CredentialRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRequest")
            .field("use_cloud", &self.use_cloud)
            .field("api_key", &self.api_key.is_some())
            .field("aws_region", &self.aws_region)
            .field("aws_access_key_id", &self.aws_access_key_id.is_some())
            .field("aws_secret_access_key", &self.aws_secret_access_key.is_some())
            .field("aws_session_token", &self.aws_session_token.is_some())
            .field("model", &self.model)
            .field("small_model", &self.small_model)
            .finish()
    }
}

#[derive(Clone)]
pub struct CredentialResolver {
    ambient: Arc<dyn AmbientSource>,
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver").finish_non_exhaustive()
    }
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::new(Arc::new(ProcessEnv))
    }
}

impl CredentialResolver {
    pub fn new(ambient: Arc<dyn AmbientSource>) -> Self {
        Self { ambient }
    }

    /// Resolve every field of `request`.
    pub fn resolve(&self, request: &CredentialRequest) -> CredentialSet {
        let use_cloud = request.use_cloud;
        let field = |value: &Option<String>, keys: &[&str]| -> Resolved<String> {
            explicit(value).or_else(|| {
                if use_cloud {
                    self.ambient_any(keys)
                } else {
                    Resolved::Unresolved
                }
            })
        };

        CredentialSet {
            use_cloud,
            // The API key only ever comes from the request.
            api_key: explicit(&request.api_key),
            aws_region: field(&request.aws_region, &[AWS_REGION, AWS_DEFAULT_REGION]),
            aws_access_key_id: field(&request.aws_access_key_id, &[AWS_ACCESS_KEY_ID]),
            aws_secret_access_key: field(&request.aws_secret_access_key, &[AWS_SECRET_ACCESS_KEY]),
            aws_session_token: field(&request.aws_session_token, &[AWS_SESSION_TOKEN]),
            model: field(&request.model, &[ANTHROPIC_MODEL]),
            small_model: field(&request.small_model, &[ANTHROPIC_SMALL_FAST_MODEL]),
        }
    }

    fn ambient_any(&self, keys: &[&str]) -> Resolved<String> {
        keys.iter()
            .find_map(|k| self.ambient.get(k))
            .map(Resolved::Ambient)
            .unwrap_or(Resolved::Unresolved)
    }
}

fn explicit(value: &Option<String>) -> Resolved<String> {
    match value {
        Some(v) if !v.is_empty() => Resolved::Explicit(v.clone()),
        _ => Resolved::Unresolved,
    }
}

/// Container environment (`KEY=value`) for a resolved credential set.
///
/// Unresolved fields are omitted rather than set empty.
pub fn container_env(set: &CredentialSet) -> Vec<String> {
    let mut env = Vec::new();
    let mut push = |key: &str, value: &Resolved<String>| {
        if let Some(v) = value.value() {
            env.push(format!("{key}={v}"));
        }
    };

    push(ANTHROPIC_API_KEY, &set.api_key);
    if set.use_cloud {
        push(AWS_REGION, &set.aws_region);
        push(AWS_ACCESS_KEY_ID, &set.aws_access_key_id);
        push(AWS_SECRET_ACCESS_KEY, &set.aws_secret_access_key);
        push(AWS_SESSION_TOKEN, &set.aws_session_token);
        push(ANTHROPIC_MODEL, &set.model);
        push(ANTHROPIC_SMALL_FAST_MODEL, &set.small_model);
        env.push(format!("{USE_BEDROCK}=1"));
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(env: MapEnv) -> CredentialResolver {
        CredentialResolver::new(Arc::new(env))
    }

    fn ambient() -> MapEnv {
        MapEnv::new()
            .with(ANTHROPIC_API_KEY, "sk-ambient")
            .with(AWS_REGION, "eu-west-1")
            .with(AWS_ACCESS_KEY_ID, "AKIAAMBIENT")
            .with(AWS_SECRET_ACCESS_KEY, "ambient-secret")
            .with(ANTHROPIC_MODEL, "ambient-model")
    }

    #[test]
    fn test_direct_explicit_key() {
        let set = resolver(ambient()).resolve(&CredentialRequest {
            api_key: Some("sk-explicit".into()),
            ..Default::default()
        });
        assert_eq!(set.api_key, Resolved::Explicit("sk-explicit".into()));
        assert!(!set.use_cloud);
    }

    #[test]
    fn test_direct_never_reads_ambient() {
        let set = resolver(ambient()).resolve(&CredentialRequest::default());
        assert_eq!(set.api_key, Resolved::Unresolved);
        assert_eq!(set.aws_region, Resolved::Unresolved);
        assert_eq!(set.model, Resolved::Unresolved);
    }

    #[test]
    fn test_cloud_explicit_beats_ambient() {
        let set = resolver(ambient()).resolve(&CredentialRequest {
            use_cloud: true,
            aws_region: Some("us-east-1".into()),
            ..Default::default()
        });
        assert_eq!(set.aws_region, Resolved::Explicit("us-east-1".into()));
        assert_eq!(set.aws_access_key_id, Resolved::Ambient("AKIAAMBIENT".into()));
        assert_eq!(set.model, Resolved::Ambient("ambient-model".into()));
        assert_eq!(set.aws_session_token, Resolved::Unresolved);
    }

    #[test]
    fn test_cloud_region_falls_back_to_default_region() {
        let env = MapEnv::new().with(AWS_DEFAULT_REGION, "ap-south-1");
        let set = resolver(env).resolve(&CredentialRequest {
            use_cloud: true,
            ..Default::default()
        });
        assert_eq!(set.aws_region, Resolved::Ambient("ap-south-1".into()));
    }

    #[test]
    fn test_empty_explicit_counts_as_absent() {
        let set = resolver(ambient()).resolve(&CredentialRequest {
            use_cloud: true,
            aws_region: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(set.aws_region, Resolved::Ambient("eu-west-1".into()));
    }

    #[test]
    fn test_missing_everything_still_resolves() {
        let set = resolver(MapEnv::new()).resolve(&CredentialRequest {
            use_cloud: true,
            ..Default::default()
        });
        assert!(set.use_cloud);
        assert_eq!(set.aws_access_key_id.value(), None);
        assert_eq!(container_env(&set), vec![format!("{USE_BEDROCK}=1")]);
    }

    #[test]
    fn test_container_env_direct() {
        let set = resolver(ambient()).resolve(&CredentialRequest {
            api_key: Some("sk-explicit".into()),
            ..Default::default()
        });
        assert_eq!(container_env(&set), vec!["ANTHROPIC_API_KEY=sk-explicit".to_string()]);
    }

    #[test]
    fn test_container_env_cloud() {
        let set = resolver(ambient()).resolve(&CredentialRequest {
            use_cloud: true,
            small_model: Some("haiku".into()),
            ..Default::default()
        });
        let env = container_env(&set);
        assert!(env.contains(&"CLAUDE_CODE_USE_BEDROCK=1".to_string()));
        assert!(env.contains(&"AWS_REGION=eu-west-1".to_string()));
        assert!(env.contains(&"ANTHROPIC_SMALL_FAST_MODEL=haiku".to_string()));
        assert!(!env.iter().any(|e| e.starts_with("ANTHROPIC_API_KEY=")));
        assert!(!env.iter().any(|e| e.starts_with("AWS_SESSION_TOKEN=")));
    }

    #[test]
    fn test_request_debug_redacts() {
        let req = CredentialRequest {
            api_key: Some("sk-very-secret".into()),
            aws_secret_access_key: Some("shh".into()),
            ..Default::default()
        };
        let dbg = format!("{req:?}");
        assert!(!dbg.contains("sk-very-secret"));
        assert!(!dbg.contains("shh"));
    }
}
