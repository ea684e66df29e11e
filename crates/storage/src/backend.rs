//! Object store trait definition.
//!
//! The binary-cache protocol needs nothing beyond flat, content-addressed
//! blobs: narinfo records under `{hash}.narinfo` and archives under
//! `nar/{hash}.nar[.{compression}]`. The trait therefore mirrors the three
//! calls every blob service offers.
//!
//! # Implementing a Store
//!
//! 1. Implement [`ObjectStore`] for your client type
//! 2. Report absent objects as `Ok(None)`, never as an error
//! 3. Map transport and service failures to [`StorageError`](crate::StorageError)
//!
//! Run the [`conformance`](crate::conformance) suite (feature `testutil`)
//! against the new store. See [`MemoryObjectStore`](crate::MemoryObjectStore)
//! for a reference implementation.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    error::StorageResult,
    types::{ObjectMeta, StoredObject},
};

/// Abstract blob storage used by the cache core.
///
/// Implementations must be thread-safe; the missing-paths check probes many
/// keys concurrently through a shared handle.
///
/// | Method | Description |
/// |--------|-------------|
/// | [`head`](ObjectStore::head) | Probe existence, returning metadata |
/// | [`get`](ObjectStore::get) | Read a whole object |
/// | [`put`](ObjectStore::put) | Write a whole object, replacing any previous body |
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use nixcache_storage::{MemoryObjectStore, ObjectStore};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let store = MemoryObjectStore::new();
///
/// store.put("abc.narinfo", Bytes::from("StorePath: ..."), "text/x-nix-narinfo").await.unwrap();
/// let obj = store.get("abc.narinfo").await.unwrap().unwrap();
/// assert_eq!(obj.content_type.as_deref(), Some("text/x-nix-narinfo"));
/// # });
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Probes whether `key` exists.
    ///
    /// Returns `Ok(Some(meta))` if it does, `Ok(None)` if it does not.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn head(&self, key: &str) -> StorageResult<Option<ObjectMeta>>;

    /// Reads the object stored under `key`.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, key: &str) -> StorageResult<Option<StoredObject>>;

    /// Writes `body` under `key` with the given content type.
    ///
    /// Writes are whole-object and idempotent: writing the same bytes to the
    /// same key twice leaves the store in the same state as writing once.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> StorageResult<()>;

    /// Convenience wrapper over [`head`](ObjectStore::head).
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.head(key).await?.is_some())
    }
}

#[async_trait]
impl<S: ObjectStore + ?Sized> ObjectStore for Arc<S> {
    async fn head(&self, key: &str) -> StorageResult<Option<ObjectMeta>> {
        (**self).head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Option<StoredObject>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> StorageResult<()> {
        (**self).put(key, body, content_type).await
    }
}
