//! Storage error types and result alias.
//!
//! Every [`ObjectStore`](crate::ObjectStore) implementation maps its internal
//! failures onto [`StorageError`]. Callers in the cache core propagate these
//! values unmodified, so the variants describe collaborator failures only.
//! An absent object is not an error at this layer: `head` and `get` report it
//! as `Ok(None)`.
//!
//! # Example
//!
//! ```
//! use nixcache_storage::{StorageError, StorageResult};
//!
//! fn fetch(key: &str) -> StorageResult<Vec<u8>> {
//!     Err(StorageError::connection(format!("bucket unreachable while reading {key}")))
//! }
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while talking to an object store.
///
/// Errors preserve their source chain via `#[source]`, so the underlying SDK
/// or transport error stays visible to whoever logs it.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The store could not be reached.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying transport error.
        #[source]
        source: Option<BoxError>,
    },

    /// Backend-specific failure that fits no other category.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying backend error.
        #[source]
        source: Option<BoxError>,
    },

    /// The operation exceeded the backend's own time limit.
    #[error("Operation timeout")]
    Timeout,
}

impl StorageError {
    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Returns `true` for failures a caller could reasonably retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout)
    }
}
