//! GitHub Actions OIDC token verification.
//!
//! Tokens are checked in a fixed order, cheapest first, and every check has
//! its own [`AuthError`] variant:
//!
//! 1. three dot-separated segments ([`AuthError::MalformedToken`])
//! 2. header `alg` is RS256 ([`AuthError::UnsupportedAlgorithm`]) and `kid` is present
//!    ([`AuthError::MissingKeyId`])
//! 3. `iss`, `aud`, `exp`, `nbf`
//! 4. `repository_owner` present and allowed
//! 5. key lookup through the [`JwksCache`] and RS256 signature check
//!
//! The owner check runs before the key lookup so tokens from foreign
//! repositories never cause a JWKS fetch.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    error::{AuthError, Result},
    jwks::{Jwk, JwksCache},
    validation::{AllowedOwners, validate_algorithm, validate_kid},
};

/// Issuer of GitHub Actions OIDC tokens.
pub const GITHUB_OIDC_ISSUER: &str = "https://token.actions.githubusercontent.com";

/// Audience the tokens must be minted for.
pub const GITHUB_OIDC_AUDIENCE: &str = "api.flakehub.com";

/// The `aud` claim: a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// `"aud": "x"`
    Single(String),
    /// `"aud": ["x", "y"]`
    Multiple(Vec<String>),
}

impl Audience {
    /// Returns `true` if `expected` equals the audience or is one of its
    /// entries.
    #[must_use]
    pub fn accepts(&self, expected: &str) -> bool {
        match self {
            Self::Single(aud) => aud == expected,
            Self::Multiple(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

/// Claims of a GitHub Actions OIDC token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcClaims {
    /// Issuer.
    #[serde(default)]
    pub iss: String,
    /// Audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    /// Expiry, seconds since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Not-before, seconds since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// `owner/name` of the repository running the workflow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Owner of that repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_owner: Option<String>,
    /// Reference to the workflow file that requested the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_workflow_ref: Option<String>,
    /// Git ref the workflow runs on.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    /// Subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

#[derive(Deserialize)]
struct TokenHeader {
    alg: Option<String>,
    kid: Option<String>,
}

fn decode_segment<T: DeserializeOwned>(segment: &str, what: &str) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| AuthError::malformed_token(format!("{what} is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::malformed_token(format!("{what} is not valid JSON: {e}")))
}

/// Checks `iss`, `aud`, `exp` and `nbf` against `now` (seconds since epoch).
///
/// # Errors
///
/// - [`AuthError::InvalidIssuer`] unless `iss` is [`GITHUB_OIDC_ISSUER`]
/// - [`AuthError::InvalidAudience`] unless `aud` accepts [`GITHUB_OIDC_AUDIENCE`]
/// - [`AuthError::MissingClaim`] if `exp` is absent
/// - [`AuthError::TokenExpired`] if `exp <= now`
/// - [`AuthError::TokenNotYetValid`] if `nbf > now`
pub fn validate_claims(claims: &OidcClaims, now: i64) -> Result<()> {
    if claims.iss != GITHUB_OIDC_ISSUER {
        return Err(AuthError::invalid_issuer(claims.iss.clone()));
    }

    if !claims.aud.as_ref().is_some_and(|aud| aud.accepts(GITHUB_OIDC_AUDIENCE)) {
        return Err(AuthError::invalid_audience());
    }

    let exp = claims.exp.ok_or_else(|| AuthError::missing_claim("exp"))?;
    if exp <= now {
        return Err(AuthError::token_expired());
    }

    if let Some(nbf) = claims.nbf
        && nbf > now
    {
        return Err(AuthError::token_not_yet_valid());
    }

    Ok(())
}

/// Checks the `repository_owner` claim against the allow-list.
///
/// # Errors
///
/// - [`AuthError::MissingClaim`] if the claim is absent or empty
/// - [`AuthError::OwnerNotAllowed`] if it is not on the list (case-insensitive)
pub fn validate_owner(claims: &OidcClaims, allowed: &AllowedOwners) -> Result<()> {
    let owner = claims
        .repository_owner
        .as_deref()
        .filter(|owner| !owner.is_empty())
        .ok_or_else(|| AuthError::missing_claim("repository_owner"))?;

    if !allowed.contains(owner) {
        return Err(AuthError::owner_not_allowed(owner));
    }
    Ok(())
}

fn verify_signature(signing_input: &str, signature: &str, jwk: &Jwk) -> Result<()> {
    if jwk.kty != "RSA" {
        return Err(AuthError::invalid_public_key(format!("unexpected key type '{}'", jwk.kty)));
    }
    let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
        .map_err(|e| AuthError::invalid_public_key(e.to_string()))?;

    match jsonwebtoken::crypto::verify(signature, signing_input.as_bytes(), &key, Algorithm::RS256)
    {
        Ok(true) => Ok(()),
        Ok(false) | Err(_) => Err(AuthError::invalid_signature()),
    }
}

/// Verifies a GitHub Actions OIDC token against the current wall clock.
///
/// # Errors
///
/// See [`verify_github_oidc_token_at`].
pub async fn verify_github_oidc_token(
    token: &str,
    allowed: &AllowedOwners,
    jwks: &JwksCache,
) -> Result<OidcClaims> {
    verify_github_oidc_token_at(token, allowed, jwks, Utc::now().timestamp()).await
}

/// Verifies a GitHub Actions OIDC token with an explicit clock.
///
/// Returns the claims once structure, header, time window, owner and
/// signature have all been checked.
///
/// # Errors
///
/// Returns the [`AuthError`] variant of the first failed check. A
/// [`AuthError::JwksUnavailable`] means the key set could not be fetched and
/// says nothing about the token.
#[tracing::instrument(skip(token, allowed, jwks))]
pub async fn verify_github_oidc_token_at(
    token: &str,
    allowed: &AllowedOwners,
    jwks: &JwksCache,
    now: i64,
) -> Result<OidcClaims> {
    let mut segments = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(AuthError::malformed_token("token must have 3 parts separated by dots"));
    };

    let header: TokenHeader = decode_segment(header_b64, "header")?;
    validate_algorithm(header.alg.as_deref().unwrap_or_default())?;
    let kid = validate_kid(header.kid.as_deref())?;

    let claims: OidcClaims = decode_segment(payload_b64, "payload")?;
    validate_claims(&claims, now)?;
    validate_owner(&claims, allowed)?;

    let jwk = jwks.find_key(kid).await?;
    let signing_input = &token[..header_b64.len() + 1 + payload_b64.len()];
    verify_signature(signing_input, signature, &jwk)?;

    tracing::debug!(
        kid,
        owner = claims.repository_owner.as_deref().unwrap_or_default(),
        repository = claims.repository.as_deref().unwrap_or_default(),
        "OIDC token verified"
    );

    Ok(claims)
}
