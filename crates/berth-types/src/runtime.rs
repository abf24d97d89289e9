//! Runtime profiles, resolved credentials and transfer direction.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Credential scheme a session's agent runs under.
///
/// Serializes as `"direct"` or `{"cloud": {"region": .., "model": .., "smallModel": ..}}`.
/// Carries identifiers only; secret values live in [`CredentialSet`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RuntimeProfile {
    /// Direct API key.
    #[default]
    Direct,
    /// Cloud-hosted model profile (Bedrock).
    Cloud {
        region: Option<String>,
        model: Option<String>,
        small_model: Option<String>,
    },
}

/// Outcome of resolving one credential field.
///
/// Resolution never fabricates a value and never fails: `Unresolved` is passed
/// through and only surfaces if the agent rejects it at execution time.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Resolved<T> {
    /// Supplied explicitly on the request.
    Explicit(T),
    /// Taken from process-level ambient credentials.
    Ambient(T),
    #[default]
    Unresolved,
}

impl<T> Resolved<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Resolved::Explicit(v) | Resolved::Ambient(v) => Some(v),
            Resolved::Unresolved => None,
        }
    }

    /// Where the value came from: `explicit`, `ambient` or `unset`.
    pub fn source(&self) -> &'static str {
        match self {
            Resolved::Explicit(_) => "explicit",
            Resolved::Ambient(_) => "ambient",
            Resolved::Unresolved => "unset",
        }
    }

    /// Keep `self` if resolved, otherwise try `other`.
    pub fn or_else(self, other: impl FnOnce() -> Resolved<T>) -> Resolved<T> {
        match self {
            Resolved::Unresolved => other(),
            resolved => resolved,
        }
    }
}

// Values are secrets; only the source is ever printed.
impl<T> fmt::Debug for Resolved<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source())
    }
}

/// Effective credential values for one session. Held in memory only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    /// Cloud profile requested.
    pub use_cloud: bool,
    pub api_key: Resolved<String>,
    pub aws_region: Resolved<String>,
    pub aws_access_key_id: Resolved<String>,
    pub aws_secret_access_key: Resolved<String>,
    pub aws_session_token: Resolved<String>,
    pub model: Resolved<String>,
    pub small_model: Resolved<String>,
}

impl CredentialSet {
    /// Field name → resolution source, for echoing and logging.
    pub fn summary(&self) -> BTreeMap<&'static str, &'static str> {
        let mut out = BTreeMap::new();
        out.insert("apiKey", self.api_key.source());
        if self.use_cloud {
            out.insert("awsRegion", self.aws_region.source());
            out.insert("awsAccessKeyId", self.aws_access_key_id.source());
            out.insert("awsSecretAccessKey", self.aws_secret_access_key.source());
            out.insert("awsSessionToken", self.aws_session_token.source());
            out.insert("bedrockModel", self.model.source());
            out.insert("bedrockSmallModel", self.small_model.source());
        }
        out
    }

    /// The non-secret runtime profile this set implies.
    pub fn profile(&self) -> RuntimeProfile {
        if self.use_cloud {
            RuntimeProfile::Cloud {
                region: self.aws_region.value().cloned(),
                model: self.model.value().cloned(),
                small_model: self.small_model.value().cloned(),
            }
        } else {
            RuntimeProfile::Direct
        }
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("use_cloud", &self.use_cloud)
            .field("sources", &self.summary())
            .finish()
    }
}

/// Which side of a copy the source path lives on.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema,
    strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransferDirection {
    /// Source on the host, destination inside the container.
    ToContainer,
    /// Source inside the container, destination on the host.
    FromContainer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_accessors() {
        let e = Resolved::Explicit("a".to_string());
        let a = Resolved::Ambient("b".to_string());
        let u: Resolved<String> = Resolved::Unresolved;

        assert_eq!(e.value().map(String::as_str), Some("a"));
        assert_eq!(a.source(), "ambient");
        assert_eq!(u.value(), None);
        assert_eq!(u.or_else(|| Resolved::Ambient("c".into())).source(), "ambient");
        assert_eq!(e.or_else(|| Resolved::Ambient("c".into())).source(), "explicit");
    }

    #[test]
    fn test_debug_never_prints_secrets() {
        let set = CredentialSet {
            use_cloud: true,
            api_key: Resolved::Explicit("sk-ant-123".into()),
            aws_secret_access_key: Resolved::Ambient("wJalrXUtnFEMI".into()),
            ..Default::default()
        };
        let dbg = format!("{set:?}");
        assert!(!dbg.contains("sk-ant-123"));
        assert!(!dbg.contains("wJalrXUtnFEMI"));
        assert!(dbg.contains("explicit"));
        assert!(dbg.contains("ambient"));
    }

    #[test]
    fn test_summary_hides_cloud_fields_for_direct() {
        let set = CredentialSet::default();
        let summary = set.summary();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary["apiKey"], "unset");
    }

    #[test]
    fn test_profile_serialization() {
        assert_eq!(serde_json::to_value(RuntimeProfile::Direct).unwrap(), "direct");

        let set = CredentialSet {
            use_cloud: true,
            aws_region: Resolved::Explicit("us-east-1".into()),
            small_model: Resolved::Ambient("haiku".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(set.profile()).unwrap();
        assert_eq!(json["cloud"]["region"], "us-east-1");
        assert_eq!(json["cloud"]["smallModel"], "haiku");
        assert!(json["cloud"]["model"].is_null());
    }

    #[test]
    fn test_direction_strings() {
        assert_eq!(TransferDirection::ToContainer.to_string(), "to_container");
        assert_eq!(
            serde_json::from_str::<TransferDirection>("\"from_container\"").unwrap(),
            TransferDirection::FromContainer
        );
        assert!(serde_json::from_str::<TransferDirection>("\"sideways\"").is_err());
    }
}
