//! Shared test utilities for object store consumers.
//!
//! Feature-gated behind `testutil` so none of it reaches production builds.
//!
//! ```toml
//! [dev-dependencies]
//! nixcache-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! - [`RecordingObjectStore`] wraps a [`MemoryObjectStore`] and records every call, so tests can
//!   count how many writes an operation performed.
//! - [`FailingObjectStore`] returns a fixed error from selected operations.
//! - [`assert_connection_error!`](crate::assert_connection_error) matches a [`StorageResult`] against
//!   [`StorageError::Connection`].

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::{
    backend::ObjectStore,
    error::{StorageError, StorageResult},
    memory::MemoryObjectStore,
    types::{ObjectMeta, StoredObject},
};

/// One recorded call against a [`RecordingObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectOp {
    /// A `head` probe.
    Head(String),
    /// A `get` read.
    Get(String),
    /// A `put` write.
    Put {
        /// Key written.
        key: String,
        /// Content type supplied.
        content_type: String,
        /// Body length.
        size: usize,
    },
}

/// Memory-backed store that records every operation.
#[derive(Clone, Default)]
pub struct RecordingObjectStore {
    inner: MemoryObjectStore,
    ops: Arc<Mutex<Vec<ObjectOp>>>,
}

impl RecordingObjectStore {
    /// Creates an empty recording store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying memory store, for seeding or inspecting state without
    /// recording.
    #[must_use]
    pub fn inner(&self) -> &MemoryObjectStore {
        &self.inner
    }

    /// Snapshot of all recorded operations, in call order.
    #[must_use]
    pub fn ops(&self) -> Vec<ObjectOp> {
        self.ops.lock().clone()
    }

    /// Number of `put` calls for `key`.
    #[must_use]
    pub fn put_count(&self, key: &str) -> usize {
        self.ops.lock().iter().filter(|op| matches!(op, ObjectOp::Put { key: k, .. } if k == key)).count()
    }

    /// Number of `head` calls for `key`.
    #[must_use]
    pub fn head_count(&self, key: &str) -> usize {
        self.ops.lock().iter().filter(|op| matches!(op, ObjectOp::Head(k) if k == key)).count()
    }

    /// Keys of all `put` calls, in call order.
    #[must_use]
    pub fn put_keys(&self) -> Vec<String> {
        self.ops
            .lock()
            .iter()
            .filter_map(|op| match op {
                ObjectOp::Put { key, .. } => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forgets recorded operations; stored objects are kept.
    pub fn clear_ops(&self) {
        self.ops.lock().clear();
    }
}

#[async_trait]
impl ObjectStore for RecordingObjectStore {
    async fn head(&self, key: &str) -> StorageResult<Option<ObjectMeta>> {
        self.ops.lock().push(ObjectOp::Head(key.to_owned()));
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Option<StoredObject>> {
        self.ops.lock().push(ObjectOp::Get(key.to_owned()));
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> StorageResult<()> {
        self.ops.lock().push(ObjectOp::Put {
            key: key.to_owned(),
            content_type: content_type.to_owned(),
            size: body.len(),
        });
        self.inner.put(key, body, content_type).await
    }
}

/// Which operations a [`FailingObjectStore`] rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    /// Every operation fails.
    All,
    /// Only `head` fails.
    Head,
    /// Only `get` fails.
    Get,
    /// Only `put` fails.
    Put,
}

/// Store that fails selected operations with a fixed error.
///
/// Operations that are not selected delegate to an inner [`MemoryObjectStore`].
#[derive(Clone)]
pub struct FailingObjectStore {
    inner: MemoryObjectStore,
    fail_on: FailOn,
    error: StorageError,
}

impl FailingObjectStore {
    /// Creates a store failing `fail_on` operations with `error`.
    #[must_use]
    pub fn new(fail_on: FailOn, error: StorageError) -> Self {
        Self { inner: MemoryObjectStore::new(), fail_on, error }
    }

    /// Shorthand for a store whose every call fails with a connection error.
    #[must_use]
    pub fn unreachable() -> Self {
        Self::new(FailOn::All, StorageError::connection("object store unreachable"))
    }

    /// The underlying memory store.
    #[must_use]
    pub fn inner(&self) -> &MemoryObjectStore {
        &self.inner
    }

    fn check(&self, op: FailOn) -> StorageResult<()> {
        if self.fail_on == FailOn::All || self.fail_on == op {
            return Err(self.error.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FailingObjectStore {
    async fn head(&self, key: &str) -> StorageResult<Option<ObjectMeta>> {
        self.check(FailOn::Head)?;
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Option<StoredObject>> {
        self.check(FailOn::Get)?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> StorageResult<()> {
        self.check(FailOn::Put)?;
        self.inner.put(key, body, content_type).await
    }
}

/// Assert that a [`StorageResult`] is a [`StorageError::Connection`].
#[macro_export]
macro_rules! assert_connection_error {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::Connection { .. })),
            "expected StorageError::Connection, got: {:?}",
            $result,
        );
    };
}
