//! Error types for the cache core.
//!
//! [`CacheError`] covers malformed input, invalid identifiers and keys,
//! missing objects, and storage failures. Storage failures keep the original
//! [`StorageError`] so callers can tell "backend unavailable" apart from a
//! bad request. [`CacheError::kind`] gives the coarse category used to pick a
//! response status.

use nixcache_storage::StorageError;
use thiserror::Error;

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Coarse category of a [`CacheError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Malformed input: narinfo, upload header, base64, missing separators,
    /// an empty request body.
    Format,
    /// Well-formed input with an invalid value: store-path hash, key length,
    /// public-key encoding.
    Validation,
    /// The requested object does not exist.
    NotFound,
    /// The object store failed.
    Storage,
}

/// Errors produced by the cache core.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// Input could not be parsed.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// A store-path hash is not 32 characters of the Nix base-32 alphabet.
    #[error("Invalid store path hash: {hash}")]
    InvalidStorePathHash {
        /// The rejected value.
        hash: String,
    },

    /// A private key decoded to an unsupported number of bytes.
    #[error("Invalid key length: {length}, expected 32, 48 (PKCS#8), or 64")]
    InvalidKeyLength {
        /// Decoded length in bytes.
        length: usize,
    },

    /// A public key could not be decoded or is not a valid curve point.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// A public key decoded to something other than 32 bytes.
    #[error("Invalid public key length: {length}, expected 32")]
    InvalidPublicKeyLength {
        /// Decoded length in bytes.
        length: usize,
    },

    /// The requested object is absent from storage.
    #[error("Not found: {key}")]
    NotFound {
        /// Storage key that was looked up.
        key: String,
    },

    /// An upload carried a zero-length NAR body.
    #[error("Empty request body")]
    EmptyBody,

    /// The object store failed; the error is passed through unchanged.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CacheError {
    /// Creates a new `InvalidFormat` error.
    #[must_use]
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat(message.into())
    }

    /// Creates a new `InvalidStorePathHash` error.
    #[must_use]
    pub fn invalid_store_path_hash(hash: impl Into<String>) -> Self {
        Self::InvalidStorePathHash { hash: hash.into() }
    }

    /// Creates a new `InvalidKeyLength` error.
    #[must_use]
    pub fn invalid_key_length(length: usize) -> Self {
        Self::InvalidKeyLength { length }
    }

    /// Creates a new `InvalidPublicKey` error.
    #[must_use]
    pub fn invalid_public_key(message: impl Into<String>) -> Self {
        Self::InvalidPublicKey(message.into())
    }

    /// Creates a new `InvalidPublicKeyLength` error.
    #[must_use]
    pub fn invalid_public_key_length(length: usize) -> Self {
        Self::InvalidPublicKeyLength { length }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Creates a new `EmptyBody` error.
    #[must_use]
    pub fn empty_body() -> Self {
        Self::EmptyBody
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFormat(_) | Self::EmptyBody => ErrorKind::Format,
            Self::InvalidStorePathHash { .. }
            | Self::InvalidKeyLength { .. }
            | Self::InvalidPublicKey(_)
            | Self::InvalidPublicKeyLength { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}
