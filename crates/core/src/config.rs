//! Cache configuration.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{
    cache_info::{CacheConfigResponse, CacheInfo},
    error::Result,
    signing::NarSigner,
    store_path::DEFAULT_STORE_DIR,
};

fn default_priority() -> u32 {
    41
}

fn default_store_dir() -> String {
    DEFAULT_STORE_DIR.to_owned()
}

/// Identity and signing key of one cache.
///
/// ```
/// use nixcache_core::CacheConfig;
///
/// let config = CacheConfig::builder()
///     .cache_name("main")
///     .signing_key("MC4CAQAwBQYDK2VwBCIEIHvA+mbf8LQjQbpRHwGdev2LMEqPCfAb6SY9askCfqRu")
///     .signing_key_name("main-1")
///     .build();
///
/// assert_eq!(config.priority, 41);
/// assert_eq!(config.signer()?.key_name(), "main-1");
/// # Ok::<(), nixcache_core::CacheError>(())
/// ```
#[derive(Clone, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Name clients use for the cache in API requests.
    #[builder(into)]
    pub cache_name: String,

    /// Substituter priority advertised to clients.
    #[serde(default = "default_priority")]
    #[builder(default = default_priority())]
    pub priority: u32,

    /// Store directory of uploaded paths.
    #[serde(default = "default_store_dir")]
    #[builder(default = default_store_dir(), into)]
    pub store_dir: String,

    /// Ed25519 private key, bare base64 or `{name}:{base64}`.
    #[builder(with = |key: impl Into<String>| Zeroizing::new(key.into()))]
    pub signing_key: Zeroizing<String>,

    /// Name published with the public key and every signature.
    #[builder(into)]
    pub signing_key_name: String,
}

impl CacheConfig {
    /// Decodes the signing key.
    ///
    /// # Errors
    ///
    /// See [`SecretKey::decode`](crate::signing::SecretKey::decode).
    pub fn signer(&self) -> Result<NarSigner> {
        NarSigner::decode(&self.signing_key, self.signing_key_name.as_str())
    }

    /// The `nix-cache-info` document for this cache.
    #[must_use]
    pub fn cache_info(&self) -> CacheInfo {
        CacheInfo { store_dir: self.store_dir.clone(), ..CacheInfo::new(self.priority) }
    }

    /// The `cache-config` response for a server reachable at `base_url`.
    ///
    /// # Errors
    ///
    /// See [`SecretKey::decode`](crate::signing::SecretKey::decode).
    pub fn cache_config(&self, base_url: &str) -> Result<CacheConfigResponse> {
        let public_key = self.signer()?.public_key();
        Ok(CacheConfigResponse::new(base_url, public_key, self.priority, self.store_dir.as_str()))
    }
}

impl std::fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConfig")
            .field("cache_name", &self.cache_name)
            .field("priority", &self.priority)
            .field("store_dir", &self.store_dir)
            .field("signing_key", &"<redacted>")
            .field("signing_key_name", &self.signing_key_name)
            .finish()
    }
}
