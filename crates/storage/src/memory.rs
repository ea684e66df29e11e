//! In-memory object store.
//!
//! [`MemoryObjectStore`] keeps every object in a [`BTreeMap`] behind a
//! [`parking_lot::RwLock`]. It is used by tests and local development; data is
//! lost when the process exits.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use nixcache_storage::{MemoryObjectStore, ObjectStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryObjectStore::new();
//!
//!     store.put("nar/abc.nar", Bytes::from_static(b"nar"), "application/x-nix-nar").await.unwrap();
//!     assert!(store.exists("nar/abc.nar").await.unwrap());
//! }
//! ```

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use fail::fail_point;
use parking_lot::RwLock;

use crate::{
    backend::ObjectStore,
    error::StorageResult,
    types::{ObjectMeta, StoredObject},
};

/// In-memory [`ObjectStore`].
///
/// Cheaply cloneable; all clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
}

impl MemoryObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// All stored keys in lexicographic order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for MemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryObjectStore").field("objects", &self.len()).finish()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    #[tracing::instrument(skip(self))]
    async fn head(&self, key: &str) -> StorageResult<Option<ObjectMeta>> {
        fail_point!("memory-store-head", |_| {
            Err(crate::error::StorageError::connection("injected head failure"))
        });

        Ok(self.objects.read().get(key).map(StoredObject::meta))
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, key: &str) -> StorageResult<Option<StoredObject>> {
        Ok(self.objects.read().get(key).cloned())
    }

    #[tracing::instrument(skip(self, body), fields(size = body.len()))]
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> StorageResult<()> {
        fail_point!("memory-store-put", |_| {
            Err(crate::error::StorageError::internal("injected put failure"))
        });

        let content_type = (!content_type.is_empty()).then(|| content_type.to_owned());
        let object = StoredObject::new(body, content_type);
        self.objects.write().insert(key.to_owned(), object);
        Ok(())
    }
}
