//! Cached JSON Web Key Set for GitHub Actions OIDC verification.
//!
//! [`JwksCache`] owns a single immutable [`JwksSnapshot`] (keys indexed by
//! `kid` plus the instant they were fetched) and the [`JwksFetcher`] used to
//! replace it. Readers clone an `Arc` to the current snapshot; a refresh builds
//! a complete new snapshot and swaps it in. Concurrent refreshes may race, but
//! every completed fetch is a full key set, so the last writer winning is
//! harmless.
//!
//! ```text
//! find_key(kid)
//!   → keys(): snapshot younger than TTL? use it : fetch + swap
//!   → kid present? done
//!   → refresh() once (forced fetch + swap)
//!   → kid present? done : KeyNotFound
//! ```
//!
//! A failed fetch is reported as [`AuthError::JwksUnavailable`] and is never
//! retried here.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use fail::fail_point;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{AuthError, Result};

/// GitHub Actions OIDC key set endpoint.
pub const GITHUB_OIDC_JWKS_URL: &str = "https://token.actions.githubusercontent.com/.well-known/jwks";

/// How long a fetched key set is served before it is refetched (1 hour).
pub const DEFAULT_JWKS_TTL: Duration = Duration::from_secs(3_600);

/// A single RSA key from a JWKS document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key ID.
    pub kid: String,
    /// Key type; `RSA` for GitHub.
    pub kty: String,
    /// Modulus, base64url.
    pub n: String,
    /// Public exponent, base64url.
    pub e: String,
    /// Declared algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Declared usage (`sig`).
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
}

/// A JWKS document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    /// Published keys.
    pub keys: Vec<Jwk>,
}

/// Source of key set documents.
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    /// Fetches the current key set.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::JwksUnavailable`] if the key set cannot be
    /// retrieved or decoded.
    async fn fetch(&self) -> Result<Jwks>;
}

/// Fetches a key set over HTTPS with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpJwksFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpJwksFetcher {
    /// Creates a fetcher for `url` with a default client.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    /// Creates a fetcher for `url` sharing an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }

    /// Fetcher for the GitHub Actions key set.
    #[must_use]
    pub fn github() -> Self {
        Self::new(GITHUB_OIDC_JWKS_URL)
    }

    /// The endpoint this fetcher reads from.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl JwksFetcher for HttpJwksFetcher {
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<Jwks> {
        let response = self.client.get(&self.url).send().await.map_err(|e| {
            AuthError::jwks_unavailable_with_source("failed to fetch GitHub OIDC JWKS", e)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::jwks_unavailable(format!(
                "failed to fetch GitHub OIDC JWKS: HTTP {}",
                status.as_u16()
            )));
        }

        response
            .json::<Jwks>()
            .await
            .map_err(|e| AuthError::jwks_unavailable_with_source("malformed JWKS document", e))
    }
}

/// An immutable, fully fetched key set.
#[derive(Debug)]
pub struct JwksSnapshot {
    keys: HashMap<String, Jwk>,
    fetched_at: Instant,
}

impl JwksSnapshot {
    /// Indexes `jwks` by key ID. When a `kid` repeats, the first entry wins.
    #[must_use]
    pub fn new(jwks: Jwks, fetched_at: Instant) -> Self {
        let mut keys = HashMap::with_capacity(jwks.keys.len());
        for key in jwks.keys {
            keys.entry(key.kid.clone()).or_insert(key);
        }
        Self { keys, fetched_at }
    }

    /// Looks up a key by ID.
    #[must_use]
    pub fn get(&self, kid: &str) -> Option<&Jwk> {
        self.keys.get(kid)
    }

    /// Number of distinct key IDs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the set holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// When the set was fetched.
    #[must_use]
    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// TTL-bounded, read-through cache of a remote key set.
///
/// Shared by reference (typically `Arc<JwksCache>`) between every request
/// that verifies an OIDC token.
pub struct JwksCache {
    fetcher: Arc<dyn JwksFetcher>,
    ttl: Duration,
    snapshot: RwLock<Option<Arc<JwksSnapshot>>>,
}

impl JwksCache {
    /// Creates an empty cache with [`DEFAULT_JWKS_TTL`].
    #[must_use]
    pub fn new(fetcher: Arc<dyn JwksFetcher>) -> Self {
        Self::with_ttl(fetcher, DEFAULT_JWKS_TTL)
    }

    /// Creates an empty cache with a custom TTL.
    #[must_use]
    pub fn with_ttl(fetcher: Arc<dyn JwksFetcher>, ttl: Duration) -> Self {
        Self { fetcher, ttl, snapshot: RwLock::new(None) }
    }

    /// Cache backed by the GitHub Actions JWKS endpoint.
    #[must_use]
    pub fn github() -> Self {
        Self::new(Arc::new(HttpJwksFetcher::github()))
    }

    /// The configured TTL.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The current snapshot, fresh or not, without fetching.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<JwksSnapshot>> {
        self.snapshot.read().clone()
    }

    /// Returns the cached snapshot if it is within the TTL, otherwise fetches
    /// and installs a new one.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::JwksUnavailable`] if a fetch was needed and failed.
    #[tracing::instrument(skip(self))]
    pub async fn keys(&self) -> Result<Arc<JwksSnapshot>> {
        if let Some(snapshot) = self.snapshot()
            && snapshot.is_fresh(self.ttl)
        {
            tracing::debug!(cache = "jwks", "cache hit");
            return Ok(snapshot);
        }
        tracing::debug!(cache = "jwks", "cache miss");

        self.refresh().await
    }

    /// Fetches unconditionally and replaces the snapshot.
    ///
    /// On failure the previous snapshot is left in place.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::JwksUnavailable`] if the fetch failed.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Arc<JwksSnapshot>> {
        fail_point!("jwks-before-fetch", |_| {
            Err(AuthError::jwks_unavailable("injected failure before JWKS fetch"))
        });

        let jwks = match self.fetcher.fetch().await {
            Ok(jwks) => jwks,
            Err(err) => {
                tracing::warn!(cache = "jwks", error = %err, "JWKS fetch failed");
                return Err(err);
            },
        };

        let snapshot = Arc::new(JwksSnapshot::new(jwks, Instant::now()));
        *self.snapshot.write() = Some(Arc::clone(&snapshot));
        tracing::debug!(cache = "jwks", keys = snapshot.len(), "snapshot replaced");

        Ok(snapshot)
    }

    /// Finds the key for `kid`, forcing at most one refresh when it is not in
    /// the current snapshot.
    ///
    /// # Errors
    ///
    /// - [`AuthError::KeyNotFound`] if the key is absent after the refresh
    /// - [`AuthError::JwksUnavailable`] if a fetch failed
    #[tracing::instrument(skip(self))]
    pub async fn find_key(&self, kid: &str) -> Result<Jwk> {
        let snapshot = self.keys().await?;
        if let Some(key) = snapshot.get(kid) {
            return Ok(key.clone());
        }

        tracing::debug!(cache = "jwks", kid, "unknown kid, forcing refresh");
        let snapshot = self.refresh().await?;
        snapshot.get(kid).cloned().ok_or_else(|| AuthError::key_not_found(kid))
    }

    /// Drops the snapshot so the next read fetches.
    pub fn invalidate(&self) {
        *self.snapshot.write() = None;
        tracing::debug!(cache = "jwks", "snapshot invalidated");
    }
}

impl std::fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksCache")
            .field("ttl", &self.ttl)
            .field("keys", &self.snapshot().map(|s| s.len()))
            .finish_non_exhaustive()
    }
}
