//! # nixcache authentication
//!
//! Request authorization for the binary cache.
//!
//! This crate provides:
//! - **Legacy tokens**: static read and write bearer tokens (also accepted as a Basic-auth
//!   password, the way Nix and Attic clients send them)
//! - **GitHub Actions OIDC**: RS256 tokens from `token.actions.githubusercontent.com`, restricted
//!   to an allow-list of repository owners
//! - **JWKS cache**: a TTL-bounded, explicitly owned snapshot of GitHub's signing keys
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use nixcache_authn::{AccessLevel, AuthConfig, AuthDecision, AuthGate, JwksCache};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::builder()
//!     .read_token("read-secret")
//!     .write_token("write-secret")
//!     .allowed_owners("my-org")
//!     .build();
//! let gate = AuthGate::new(&config, Arc::new(JwksCache::github()));
//!
//! match gate.authorize(Some("Bearer write-secret"), AccessLevel::Write).await? {
//!     AuthDecision::Granted(_) => println!("ok"),
//!     AuthDecision::Unauthorized => println!("401"),
//!     AuthDecision::Forbidden => println!("403"),
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Authorization configuration.
pub mod config;
/// Authentication error types.
pub mod error;
/// Composite authorization gate and header parsing.
pub mod gate;
/// Cached JSON Web Key Set.
pub mod jwks;
/// GitHub Actions OIDC verification.
pub mod oidc;
/// Shared test fixtures.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;
/// Algorithm and allow-list validation.
pub mod validation;

pub use config::AuthConfig;
pub use error::{AuthError, Result};
pub use gate::{AccessLevel, AuthDecision, AuthGate, Grant, parse_authorization_header};
pub use jwks::{
    DEFAULT_JWKS_TTL, GITHUB_OIDC_JWKS_URL, HttpJwksFetcher, Jwk, Jwks, JwksCache, JwksFetcher,
    JwksSnapshot,
};
pub use oidc::{
    Audience, GITHUB_OIDC_AUDIENCE, GITHUB_OIDC_ISSUER, OidcClaims, verify_github_oidc_token,
};
pub use validation::{
    ACCEPTED_ALGORITHMS, AllowedOwners, FORBIDDEN_ALGORITHMS, parse_allowed_owners,
    validate_algorithm,
};
