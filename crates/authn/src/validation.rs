//! Token header and allow-list validation.
//!
//! GitHub Actions signs its OIDC tokens with RS256 only. Anything else in the
//! header is rejected before the payload is even looked at, which closes off
//! algorithm substitution (`none`, or an HMAC keyed with the public modulus).

use std::collections::HashSet;

use crate::error::AuthError;

/// Algorithms that are never accepted.
///
/// - `none`: no signature at all
/// - `HS256`, `HS384`, `HS512`: symmetric, so anyone holding the public JWKS could forge tokens
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Accepted algorithms. GitHub Actions issues RS256 tokens exclusively.
pub const ACCEPTED_ALGORITHMS: &[&str] = &["RS256"];

/// Validates the `alg` header value.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] if `alg` is forbidden or not in
/// [`ACCEPTED_ALGORITHMS`].
///
/// # Examples
///
/// ```
/// use nixcache_authn::validation::validate_algorithm;
///
/// assert!(validate_algorithm("RS256").is_ok());
/// assert!(validate_algorithm("HS256").is_err());
/// assert!(validate_algorithm("EdDSA").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<(), AuthError> {
    if FORBIDDEN_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not allowed for security reasons"
        )));
    }

    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not in accepted list (only RS256 is supported)"
        )));
    }

    Ok(())
}

/// Validates the `kid` header value: present and non-empty.
///
/// # Errors
///
/// Returns [`AuthError::MissingKeyId`] otherwise.
pub fn validate_kid(kid: Option<&str>) -> Result<&str, AuthError> {
    match kid {
        Some(kid) if !kid.is_empty() => Ok(kid),
        _ => Err(AuthError::missing_key_id()),
    }
}

/// Set of repository owners permitted to authenticate through OIDC.
///
/// Entries are stored lowercased; lookups fold case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedOwners(HashSet<String>);

impl AllowedOwners {
    /// Returns `true` if no owner is allowed, which disables the OIDC path.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct owners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Case-insensitive membership test.
    #[must_use]
    pub fn contains(&self, owner: &str) -> bool {
        self.0.contains(&owner.to_lowercase())
    }
}

impl<S: AsRef<str>> FromIterator<S> for AllowedOwners {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|owner| owner.as_ref().trim().to_lowercase())
                .filter(|owner| !owner.is_empty())
                .collect(),
        )
    }
}

/// Parses a comma-separated owner list.
///
/// Entries are trimmed and lowercased; empty entries are dropped.
///
/// ```
/// use nixcache_authn::validation::parse_allowed_owners;
///
/// let owners = parse_allowed_owners(" NixOS, ,my-org ");
/// assert_eq!(owners.len(), 2);
/// assert!(owners.contains("nixos"));
/// assert!(owners.contains("MY-ORG"));
/// ```
#[must_use]
pub fn parse_allowed_owners(raw: &str) -> AllowedOwners {
    raw.split(',').collect()
}
