//! # nixcache core
//!
//! The protocol core of a Nix binary cache with Attic-compatible uploads.
//!
//! - [`store_path`]: store-path hash validation and base-name parsing
//! - [`narinfo`]: the narinfo text record
//! - [`signing`]: fingerprints, key decoding, Ed25519 signing and verification
//! - [`upload`]: the content-addressed upload flow
//! - [`missing`]: batch existence checks
//! - [`retrieval`]: narinfo and NAR reads
//! - [`cache_info`]: `nix-cache-info` and `cache-config` documents
//!
//! Storage is reached only through [`nixcache_storage::ObjectStore`].
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use nixcache_core::{NarSigner, UploadCoordinator, UploadResultKind, retrieval};
//! use nixcache_storage::{MemoryObjectStore, ObjectStore};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
//! let signer = NarSigner::decode("MC4CAQAwBQYDK2VwBCIEIHvA+mbf8LQjQbpRHwGdev2LMEqPCfAb6SY9askCfqRu", "my-cache-1")?;
//! let coordinator = UploadCoordinator::new(Arc::clone(&store), signer);
//!
//! let header = r#"{
//!     "store_path_hash": "ia70ss13m22znbl8khrf2hq72qmh5drr",
//!     "store_path": "/nix/store/ia70ss13m22znbl8khrf2hq72qmh5drr-ruby-2.7.5",
//!     "references": [],
//!     "nar_hash": "sha256:1impfw8zdgisxkghq9a3q7cn7k0frv9k9l8a7v0mmjjmlgnwpr3k",
//!     "nar_size": 3
//! }"#;
//! let result = coordinator.upload_from_header(header, Bytes::from_static(b"nar")).await?;
//! assert_eq!(result.kind, UploadResultKind::Uploaded);
//!
//! let narinfo = retrieval::get_parsed_narinfo(&*store, "ia70ss13m22znbl8khrf2hq72qmh5drr").await?;
//! assert!(narinfo.sig.starts_with("my-cache-1:"));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cache_info;
pub mod config;
pub mod error;
pub mod missing;
pub mod narinfo;
pub mod retrieval;
pub mod signing;
pub mod store_path;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod upload;

pub use cache_info::{CacheConfigResponse, CacheInfo};
pub use config::CacheConfig;
pub use error::{CacheError, ErrorKind, Result};
pub use missing::{GetMissingPathsRequest, GetMissingPathsResponse, get_missing_paths};
pub use narinfo::NarInfo;
pub use signing::{KeyEncoding, NarSigner, SecretKey, build_fingerprint, public_key_of, sign, verify};
pub use store_path::{BaseNameError, StorePathHash, StorePathName, is_valid_hash};
pub use upload::{UploadCoordinator, UploadPathNarInfo, UploadPathResult, UploadResultKind};
