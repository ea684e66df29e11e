//! Authentication error types.
//!
//! Every check performed while authorizing a request has its own variant so
//! tests and logs can tell them apart. Callers that turn these into a response
//! must not echo them back: a denial is reported as a bare
//! unauthorized/forbidden signal. The one exception is
//! [`AuthError::JwksUnavailable`], which means the key set could not be
//! fetched and must surface as a backend failure rather than a denial.

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Authentication and authorization errors.
///
/// # Non-exhaustive
///
/// New variants may be added without a semver-breaking change. Downstream
/// match expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The token is not three base64url JSON segments.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Header algorithm is absent or not accepted.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Header carries no `kid`.
    #[error("Token header missing key id")]
    MissingKeyId,

    /// `iss` is not the GitHub Actions issuer.
    #[error("Invalid issuer: {0}")]
    InvalidIssuer(String),

    /// `aud` neither equals nor contains the expected audience.
    #[error("Invalid audience")]
    InvalidAudience,

    /// `exp` is not strictly in the future.
    #[error("Token expired")]
    TokenExpired,

    /// `nbf` is in the future.
    #[error("Token not yet valid")]
    TokenNotYetValid,

    /// A required claim is absent or empty.
    #[error("Missing claim: {0}")]
    MissingClaim(String),

    /// The repository owner is not on the allow-list.
    #[error("Repository owner not allowed: {owner}")]
    OwnerNotAllowed {
        /// Owner as it appeared in the token.
        owner: String,
    },

    /// No JWKS entry matches the token's `kid`, even after a refresh.
    #[error("Signing key not found: {kid}")]
    KeyNotFound {
        /// Key ID that was not found.
        kid: String,
    },

    /// The JWKS entry could not be turned into an RSA verification key.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// RS256 signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The key set could not be fetched or decoded.
    #[error("JWKS unavailable: {message}")]
    JwksUnavailable {
        /// Description of the failure.
        message: String,
        /// The underlying transport or decode error.
        #[source]
        source: Option<BoxError>,
    },
}

impl AuthError {
    /// Creates a `MalformedToken` error.
    #[must_use]
    pub fn malformed_token(message: impl Into<String>) -> Self {
        Self::MalformedToken(message.into())
    }

    /// Creates an `UnsupportedAlgorithm` error.
    #[must_use]
    pub fn unsupported_algorithm(message: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm(message.into())
    }

    /// Creates a `MissingKeyId` error.
    #[must_use]
    pub fn missing_key_id() -> Self {
        Self::MissingKeyId
    }

    /// Creates an `InvalidIssuer` error.
    #[must_use]
    pub fn invalid_issuer(issuer: impl Into<String>) -> Self {
        Self::InvalidIssuer(issuer.into())
    }

    /// Creates an `InvalidAudience` error.
    #[must_use]
    pub fn invalid_audience() -> Self {
        Self::InvalidAudience
    }

    /// Creates a `TokenExpired` error.
    #[must_use]
    pub fn token_expired() -> Self {
        Self::TokenExpired
    }

    /// Creates a `TokenNotYetValid` error.
    #[must_use]
    pub fn token_not_yet_valid() -> Self {
        Self::TokenNotYetValid
    }

    /// Creates a `MissingClaim` error.
    #[must_use]
    pub fn missing_claim(claim: impl Into<String>) -> Self {
        Self::MissingClaim(claim.into())
    }

    /// Creates an `OwnerNotAllowed` error.
    #[must_use]
    pub fn owner_not_allowed(owner: impl Into<String>) -> Self {
        Self::OwnerNotAllowed { owner: owner.into() }
    }

    /// Creates a `KeyNotFound` error.
    #[must_use]
    pub fn key_not_found(kid: impl Into<String>) -> Self {
        Self::KeyNotFound { kid: kid.into() }
    }

    /// Creates an `InvalidPublicKey` error.
    #[must_use]
    pub fn invalid_public_key(message: impl Into<String>) -> Self {
        Self::InvalidPublicKey(message.into())
    }

    /// Creates an `InvalidSignature` error.
    #[must_use]
    pub fn invalid_signature() -> Self {
        Self::InvalidSignature
    }

    /// Creates a `JwksUnavailable` error without a source.
    #[must_use]
    pub fn jwks_unavailable(message: impl Into<String>) -> Self {
        Self::JwksUnavailable { message: message.into(), source: None }
    }

    /// Creates a `JwksUnavailable` error with a source error.
    #[must_use]
    pub fn jwks_unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::JwksUnavailable { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Returns `true` when the failure is an unreachable key set rather than a
    /// rejected credential.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::JwksUnavailable { .. })
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
