//! Object storage abstraction for the nixcache binary cache.
//!
//! The cache core never talks to a concrete blob store. It sees storage only
//! through the [`ObjectStore`] trait, which exposes the three primitives the
//! binary-cache protocol needs: an existence probe, a read, and a write.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    nixcache-core                            │
//! │     UploadCoordinator │ missing paths │ retrieval           │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  nixcache-storage                           │
//! │              ObjectStore trait (head, get, put)             │
//! ├──────────────────┬──────────────────────────────────────────┤
//! │ MemoryObjectStore│   external blob stores (S3, R2, ...)     │
//! │   (testing)      │                                          │
//! └──────────────────┴──────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use bytes::Bytes;
//! use nixcache_storage::{MemoryObjectStore, ObjectStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryObjectStore::new();
//!
//!     store.put("nix-cache-info", Bytes::from("StoreDir: /nix/store\n"), "text/plain").await?;
//!
//!     let meta = store.head("nix-cache-info").await?;
//!     assert_eq!(meta.map(|m| m.size), Some(21));
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module (recording and failing stores, assertion
//!   macros) and the `conformance` suite. Enable this in `[dev-dependencies]` for integration
//!   tests.
//! - **`failpoints`**: Compiles the `fail` injection points into [`MemoryObjectStore`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod conformance;
pub mod error;
pub mod memory;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod types;

pub use backend::ObjectStore;
pub use error::{BoxError, StorageError, StorageResult};
pub use memory::MemoryObjectStore;
pub use types::{ObjectMeta, StoredObject};
