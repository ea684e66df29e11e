//! Composite request authorization.
//!
//! ```text
//! Authorization header
//!   → absent / unparseable           → Unauthorized
//!   → legacy token matches           → Granted(Legacy)
//!   → allow-list empty               → Forbidden
//!   → OIDC verification succeeds     → Granted(Oidc)
//!   → JWKS unreachable               → Err(JwksUnavailable)
//!   → any other OIDC failure         → Forbidden
//! ```
//!
//! Denials carry no detail. The reason is logged at debug level only.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use zeroize::Zeroizing;

use crate::{
    config::AuthConfig,
    error::Result,
    jwks::JwksCache,
    oidc::{OidcClaims, verify_github_oidc_token},
    validation::AllowedOwners,
};

/// Access a route requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    /// Fetching narinfo, NARs, cache config, missing paths.
    Read,
    /// Uploading paths.
    Write,
}

/// How a request was authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    /// A static read or write token.
    Legacy,
    /// A verified GitHub Actions OIDC token.
    Oidc(Box<OidcClaims>),
}

/// Outcome of [`AuthGate::authorize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// The request may proceed.
    Granted(Grant),
    /// No usable credentials were presented.
    Unauthorized,
    /// Credentials were presented and rejected.
    Forbidden,
}

impl AuthDecision {
    /// Returns `true` for [`AuthDecision::Granted`].
    #[must_use]
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }
}

/// Extracts the credential from an `Authorization` header value.
///
/// - `Bearer <token>` (scheme case-insensitive): the token, verbatim
/// - `Basic <base64>`: everything after the first `:` of the decoded payload
///
/// Anything else, including a payload that does not decode or has no colon,
/// yields `None`.
///
/// ```
/// use nixcache_authn::gate::parse_authorization_header;
///
/// assert_eq!(parse_authorization_header("bearer abc").as_deref(), Some("abc"));
/// // base64("user:pass:word")
/// assert_eq!(parse_authorization_header("Basic dXNlcjpwYXNzOndvcmQ=").as_deref(), Some("pass:word"));
/// assert_eq!(parse_authorization_header("Digest abc"), None);
/// ```
#[must_use]
pub fn parse_authorization_header(header: &str) -> Option<String> {
    let (scheme, rest) = header.split_once(|c: char| c.is_ascii_whitespace())?;
    let credential = rest.trim_start();
    if credential.is_empty() {
        return None;
    }

    if scheme.eq_ignore_ascii_case("bearer") {
        return Some(credential.to_owned());
    }

    if scheme.eq_ignore_ascii_case("basic") {
        let decoded = STANDARD.decode(credential).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (_user, password) = decoded.split_once(':')?;
        return Some(password.to_owned());
    }

    None
}

/// Static-token check. The write token satisfies both levels; the read token
/// satisfies only [`AccessLevel::Read`]. An empty configured token never
/// matches.
#[must_use]
pub fn legacy_token_satisfies(
    token: &str,
    required: AccessLevel,
    read_token: &str,
    write_token: &str,
) -> bool {
    let matches =
        |expected: &str| !expected.is_empty() && constant_time_eq(token.as_bytes(), expected.as_bytes());
    match required {
        AccessLevel::Write => matches(write_token),
        AccessLevel::Read => matches(read_token) | matches(write_token),
    }
}

/// Byte comparison whose running time depends only on the lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Authorizes requests with legacy tokens first, then GitHub Actions OIDC.
pub struct AuthGate {
    read_token: Zeroizing<String>,
    write_token: Zeroizing<String>,
    allowed: AllowedOwners,
    jwks: Arc<JwksCache>,
}

impl AuthGate {
    /// Creates a gate from configuration and a shared key set cache.
    #[must_use]
    pub fn new(config: &AuthConfig, jwks: Arc<JwksCache>) -> Self {
        Self {
            read_token: config.read_token.clone(),
            write_token: config.write_token.clone(),
            allowed: config.owner_allow_list(),
            jwks,
        }
    }

    /// The key set cache used for OIDC verification.
    #[must_use]
    pub fn jwks(&self) -> &Arc<JwksCache> {
        &self.jwks
    }

    /// Decides whether a request carrying `header` may perform `required`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::JwksUnavailable`](crate::AuthError::JwksUnavailable)
    /// when OIDC verification could not fetch the key set. Every other failure
    /// is a [`AuthDecision::Forbidden`].
    #[tracing::instrument(skip(self, header))]
    pub async fn authorize(
        &self,
        header: Option<&str>,
        required: AccessLevel,
    ) -> Result<AuthDecision> {
        let Some(token) = header.and_then(parse_authorization_header) else {
            tracing::debug!("no usable credentials");
            return Ok(AuthDecision::Unauthorized);
        };

        if legacy_token_satisfies(&token, required, &self.read_token, &self.write_token) {
            return Ok(AuthDecision::Granted(Grant::Legacy));
        }

        if self.allowed.is_empty() {
            tracing::debug!(reason = "legacy token mismatch", "denied");
            return Ok(AuthDecision::Forbidden);
        }

        match verify_github_oidc_token(&token, &self.allowed, &self.jwks).await {
            Ok(claims) => Ok(AuthDecision::Granted(Grant::Oidc(Box::new(claims)))),
            Err(err) if err.is_unavailable() => Err(err),
            Err(err) => {
                tracing::debug!(reason = %err, "denied");
                Ok(AuthDecision::Forbidden)
            },
        }
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("allowed_owners", &self.allowed.len())
            .field("jwks", &self.jwks)
            .finish_non_exhaustive()
    }
}
