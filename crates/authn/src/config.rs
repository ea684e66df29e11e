//! Authorization configuration.
//!
//! Loading the values from the environment or a secret store is the host's
//! job; this module only defines the shape and keeps the secrets out of logs.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::validation::{AllowedOwners, parse_allowed_owners};

/// Static tokens and OIDC allow-list.
///
/// ```
/// use nixcache_authn::AuthConfig;
///
/// let config = AuthConfig::builder()
///     .read_token("r3ad")
///     .write_token("wr1te")
///     .allowed_owners("NixOS, my-org")
///     .build();
///
/// assert!(config.owner_allow_list().contains("nixos"));
/// assert!(!format!("{config:?}").contains("wr1te"));
/// ```
#[derive(Clone, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Token granting read access.
    #[builder(with = |token: impl Into<String>| Zeroizing::new(token.into()))]
    pub read_token: Zeroizing<String>,

    /// Token granting read and write access.
    #[builder(with = |token: impl Into<String>| Zeroizing::new(token.into()))]
    pub write_token: Zeroizing<String>,

    /// Comma-separated repository owners allowed through OIDC. Empty disables
    /// the OIDC path.
    #[serde(default)]
    #[builder(default, into)]
    pub allowed_owners: String,
}

impl AuthConfig {
    /// Parsed form of [`allowed_owners`](Self::allowed_owners).
    #[must_use]
    pub fn owner_allow_list(&self) -> AllowedOwners {
        parse_allowed_owners(&self.allowed_owners)
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("read_token", &"<redacted>")
            .field("write_token", &"<redacted>")
            .field("allowed_owners", &self.allowed_owners)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_without_owners_defaults_to_empty() {
        let config: AuthConfig =
            serde_json::from_str(r#"{"read_token":"r","write_token":"w"}"#).expect("parse");
        assert_eq!(config.read_token.as_str(), "r");
        assert!(config.owner_allow_list().is_empty());
    }

    #[test]
    fn test_deserialize_rejects_unknown_fields() {
        let result: Result<AuthConfig, _> =
            serde_json::from_str(r#"{"read_token":"r","write_token":"w","admin_token":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let config = AuthConfig::builder().read_token("secret-r").write_token("secret-w").build();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-r"));
        assert!(!debug.contains("secret-w"));
    }
}
