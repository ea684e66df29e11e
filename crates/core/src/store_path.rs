//! Store-path hash validation and base-name parsing.
//!
//! A store path looks like `/nix/store/{hash}-{name}`. The hash is 32
//! characters of Nix's base-32 alphabet, which leaves out `e`, `o`, `u` and
//! `t`. Everything the cache stores is keyed by that hash, so it is validated
//! before it reaches a storage key.
//!
//! ```
//! use nixcache_core::store_path::{extract_hash, is_valid_hash};
//!
//! let path = "/nix/store/ia70ss13m22znbl8khrf2hq72qmh5drr-ruby-2.7.5";
//! assert_eq!(extract_hash(path), Some("ia70ss13m22znbl8khrf2hq72qmh5drr"));
//! assert!(!is_valid_hash("eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee"));
//! ```

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{CacheError, Result};

/// Store directory used when none is configured.
pub const DEFAULT_STORE_DIR: &str = "/nix/store";

/// Length of a store-path hash in characters.
pub const STORE_PATH_HASH_LEN: usize = 32;

/// Nix's base-32 alphabet.
pub const NIX_BASE32_ALPHABET: &str = "0123456789abcdfghijklmnpqrsvwxyz";

/// Shortest possible base name: hash, dash, one name character.
const MIN_BASE_NAME_LEN: usize = STORE_PATH_HASH_LEN + 2;

/// Returns `true` iff `s` is exactly 32 characters of [`NIX_BASE32_ALPHABET`].
#[must_use]
pub fn is_valid_hash(s: &str) -> bool {
    s.len() == STORE_PATH_HASH_LEN && s.bytes().all(|b| NIX_BASE32_ALPHABET.as_bytes().contains(&b))
}

/// A validated store-path hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorePathHash(String);

impl StorePathHash {
    /// Validates `hash`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidStorePathHash`] if `hash` fails
    /// [`is_valid_hash`].
    pub fn new(hash: impl Into<String>) -> Result<Self> {
        let hash = hash.into();
        if !is_valid_hash(&hash) {
            return Err(CacheError::invalid_store_path_hash(hash));
        }
        Ok(Self(hash))
    }

    /// The hash as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key of the narinfo for this hash: `{hash}.narinfo`.
    #[must_use]
    pub fn narinfo_key(&self) -> String {
        format!("{}.narinfo", self.0)
    }
}

impl fmt::Display for StorePathHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorePathHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for StorePathHash {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for StorePathHash {
    type Error = CacheError;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for StorePathHash {
    type Error = CacheError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<StorePathHash> for String {
    fn from(hash: StorePathHash) -> Self {
        hash.0
    }
}

/// The two halves of a store-path base name, borrowed from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorePathName<'a> {
    hash: &'a str,
    name: &'a str,
}

impl<'a> StorePathName<'a> {
    /// The 32-character hash.
    #[must_use]
    pub fn hash(&self) -> &'a str {
        self.hash
    }

    /// The human-readable name after the dash.
    #[must_use]
    pub fn name(&self) -> &'a str {
        self.name
    }
}

fn is_valid_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.' | '_')
}

/// Splits a base name `{hash}-{name}` into its parts.
///
/// Returns `None` unless the input is at least 34 bytes long, has a `-` at
/// offset 32, starts with a valid hash, and has a non-empty name made only of
/// ASCII letters, digits and `+ - . _`.
#[must_use]
pub fn parse_base_name(base_name: &str) -> Option<StorePathName<'_>> {
    if base_name.len() < MIN_BASE_NAME_LEN
        || base_name.as_bytes()[STORE_PATH_HASH_LEN] != b'-'
    {
        return None;
    }

    let hash = &base_name[..STORE_PATH_HASH_LEN];
    let name = &base_name[STORE_PATH_HASH_LEN + 1..];

    if !is_valid_hash(hash) || name.is_empty() || !name.chars().all(is_valid_name_char) {
        return None;
    }

    Some(StorePathName { hash, name })
}

/// Why [`extract_base_name`] rejected a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum BaseNameError {
    /// The path does not live under the store directory.
    #[error("Path is not in store directory")]
    NotInStore,

    /// The path is the store directory itself.
    #[error("Path is store directory itself")]
    IsStoreDir,

    /// The first segment after the store directory is shorter than a base name.
    #[error("Path is too short")]
    TooShort,
}

/// Returns the first path segment after `store_dir`.
///
/// Trailing slashes are stripped from both arguments, so
/// `/nix/store/{hash}-foo/bin/foo` and `/nix/store/{hash}-foo/` both yield
/// `{hash}-foo`. The segment is only length-checked here; use
/// [`parse_base_name`] to validate it.
///
/// # Errors
///
/// See [`BaseNameError`].
pub fn extract_base_name<'a>(
    path: &'a str,
    store_dir: &str,
) -> std::result::Result<&'a str, BaseNameError> {
    let path = path.trim_end_matches('/');
    let store_dir = store_dir.trim_end_matches('/');

    let Some(rest) = path.strip_prefix(store_dir).and_then(|rest| rest.strip_prefix('/')) else {
        return Err(if path == store_dir {
            BaseNameError::IsStoreDir
        } else {
            BaseNameError::NotInStore
        });
    };

    let base_name = rest.split('/').next().unwrap_or(rest);
    if base_name.len() < MIN_BASE_NAME_LEN {
        return Err(BaseNameError::TooShort);
    }
    Ok(base_name)
}

/// Extracts the hash of a path under [`DEFAULT_STORE_DIR`].
#[must_use]
pub fn extract_hash(path: &str) -> Option<&str> {
    extract_hash_in(path, DEFAULT_STORE_DIR)
}

/// Extracts the hash of a path under `store_dir`.
///
/// Returns `None` if either [`extract_base_name`] or [`parse_base_name`]
/// rejects the path; there is no best-effort fallback.
#[must_use]
pub fn extract_hash_in<'a>(path: &'a str, store_dir: &str) -> Option<&'a str> {
    let base_name = extract_base_name(path, store_dir).ok()?;
    parse_base_name(base_name).map(|parsed| parsed.hash())
}

/// Removes a leading `{store_dir}/` from `path`, leaving other paths as they are.
#[must_use]
pub fn strip_store_dir<'a>(path: &'a str, store_dir: &str) -> &'a str {
    let store_dir = store_dir.trim_end_matches('/');
    path.strip_prefix(store_dir).and_then(|rest| rest.strip_prefix('/')).unwrap_or(path)
}
