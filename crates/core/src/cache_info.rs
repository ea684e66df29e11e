//! `nix-cache-info` and the Attic `cache-config` document.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::store_path::DEFAULT_STORE_DIR;

/// Content type served for `nix-cache-info`.
pub const CACHE_INFO_CONTENT_TYPE: &str = "text/x-nix-cache-info";

/// Priority assumed when a `nix-cache-info` document omits one.
pub const DEFAULT_PRIORITY: u32 = 40;

/// The `nix-cache-info` document.
///
/// ```
/// use nixcache_core::CacheInfo;
///
/// let info = CacheInfo::new(41);
/// assert_eq!(info.to_string(), "StoreDir: /nix/store\nWantMassQuery: 1\nPriority: 41\n");
/// assert_eq!(CacheInfo::parse(&info.to_string()), info);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInfo {
    /// Store directory the cache serves.
    pub store_dir: String,
    /// Whether clients may query many paths at once.
    pub want_mass_query: bool,
    /// Substituter priority; lower is preferred.
    pub priority: u32,
}

impl CacheInfo {
    /// The document this server publishes: default store, mass queries on.
    #[must_use]
    pub fn new(priority: u32) -> Self {
        Self { store_dir: DEFAULT_STORE_DIR.to_owned(), want_mass_query: true, priority }
    }

    /// Parses a `nix-cache-info` document.
    ///
    /// Missing or unparsable values fall back to `/nix/store`, `false` and
    /// [`DEFAULT_PRIORITY`].
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut info = Self {
            store_dir: DEFAULT_STORE_DIR.to_owned(),
            want_mass_query: false,
            priority: DEFAULT_PRIORITY,
        };

        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "StoreDir" if !value.is_empty() => info.store_dir = value.to_owned(),
                "WantMassQuery" => info.want_mass_query = value == "1",
                "Priority" => info.priority = value.parse().unwrap_or(DEFAULT_PRIORITY),
                _ => {},
            }
        }

        info
    }

    /// Renders the document; same as `to_string()`.
    #[must_use]
    pub fn generate(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CacheInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "StoreDir: {}", self.store_dir)?;
        writeln!(f, "WantMassQuery: {}", u8::from(self.want_mass_query))?;
        writeln!(f, "Priority: {}", self.priority)
    }
}

/// Response of the Attic `cache-config` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfigResponse {
    /// Base URL clients substitute from.
    pub substituter_endpoint: String,
    /// Base URL of the upload API.
    pub api_endpoint: String,
    /// Server public key, `{name}:{base64}`.
    pub public_key: String,
    /// Whether reads need no token. Always `false`.
    pub is_public: bool,
    /// Substituter priority.
    pub priority: u32,
    /// Store directory.
    pub store_dir: String,
}

impl CacheConfigResponse {
    /// Describes a private cache served from `base_url`.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        public_key: impl Into<String>,
        priority: u32,
        store_dir: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            substituter_endpoint: base_url.clone(),
            api_endpoint: base_url,
            public_key: public_key.into(),
            is_public: false,
            priority,
            store_dir: store_dir.into(),
        }
    }
}
