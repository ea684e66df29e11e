//! Content-addressed NAR upload.
//!
//! An upload is a JSON header describing the store path plus the NAR body.
//! The coordinator stores the body under a key derived from its file hash,
//! skipping the write when that key already exists, then writes a freshly
//! signed narinfo for the path. Signatures supplied by the client are never
//! stored.
//!
//! ```text
//! head nar/{hash}.nar[.{compression}] ──┬─ present ─────────────┐
//!                                       └─ absent ── put body ──┤
//!                                                               ▼
//!                     sign fingerprint (full reference paths) ─► put {store path hash}.narinfo
//! ```

use std::sync::Arc;

use bytes::Bytes;
use nixcache_storage::ObjectStore;
use serde::{Deserialize, Serialize};

use crate::{
    error::{CacheError, Result},
    narinfo::{DEFAULT_COMPRESSION, NARINFO_CONTENT_TYPE, NarInfo},
    signing::NarSigner,
    store_path::{DEFAULT_STORE_DIR, StorePathHash, extract_hash_in, strip_store_dir},
};

/// Content type of stored NAR bodies.
pub const NAR_CONTENT_TYPE: &str = "application/x-nix-nar";

/// The upload header record, as sent by Attic clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPathNarInfo {
    /// Target cache name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<String>,
    /// Hash part of `store_path`.
    pub store_path_hash: String,
    /// Full store path.
    pub store_path: String,
    /// Full store paths this path references.
    #[serde(default)]
    pub references: Vec<String>,
    /// Hash of the uncompressed NAR.
    pub nar_hash: String,
    /// Size of the uncompressed NAR.
    pub nar_size: u64,
    /// Client-side signatures. Accepted for compatibility and discarded.
    #[serde(default)]
    pub sigs: Vec<String>,
    /// Compression of the uploaded body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
    /// Hash of the uploaded body, if it differs from `nar_hash`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
    /// Size of the uploaded body, if it differs from `nar_size`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    /// Build platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Producing derivation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deriver: Option<String>,
    /// Content-address assertion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,
}

impl UploadPathNarInfo {
    /// Parses the JSON upload header.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidFormat`] if `header` is not a valid record.
    pub fn from_header(header: &str) -> Result<Self> {
        serde_json::from_str(header)
            .map_err(|e| CacheError::invalid_format(format!("invalid upload header: {e}")))
    }

    /// Compression of the body, `none` when unset or empty.
    #[must_use]
    pub fn compression(&self) -> &str {
        self.compression.as_deref().filter(|c| !c.is_empty()).unwrap_or(DEFAULT_COMPRESSION)
    }

    /// Hash of the stored body: `file_hash`, falling back to `nar_hash`.
    #[must_use]
    pub fn file_hash(&self) -> &str {
        self.file_hash.as_deref().filter(|h| !h.is_empty()).unwrap_or(&self.nar_hash)
    }

    /// Size of the stored body: `file_size`, falling back to `nar_size`.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.file_size.filter(|size| *size > 0).unwrap_or(self.nar_size)
    }

    /// Storage key of the body.
    #[must_use]
    pub fn nar_key(&self) -> String {
        nar_key(self.file_hash(), self.compression())
    }

    /// Rejects values that would not survive as a single narinfo line.
    ///
    /// Control characters are refused everywhere. Hashes, compression,
    /// system, deriver and references are single tokens, so they also may
    /// not contain whitespace.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidFormat`] naming the first offending field.
    pub fn check_fields(&self) -> Result<()> {
        let tokens = [
            ("store_path", Some(self.store_path.as_str())),
            ("nar_hash", Some(self.nar_hash.as_str())),
            ("compression", self.compression.as_deref()),
            ("file_hash", self.file_hash.as_deref()),
            ("system", self.system.as_deref()),
            ("deriver", self.deriver.as_deref()),
        ];
        for (field, value) in tokens {
            if value.is_some_and(|v| !is_token(v)) {
                return Err(CacheError::invalid_format(format!("{field} must be a single token")));
            }
        }
        if self.references.iter().any(|r| !is_token(r)) {
            return Err(CacheError::invalid_format("references must be single tokens"));
        }
        if self.ca.as_deref().is_some_and(|ca| ca.chars().any(char::is_control)) {
            return Err(CacheError::invalid_format("ca must not contain control characters"));
        }
        Ok(())
    }
}

fn is_token(value: &str) -> bool {
    !value.chars().any(|c| c.is_control() || c.is_whitespace())
}

/// Storage key for a NAR body: `nar/{digest}.nar[.{compression}]`.
///
/// `digest` is the part of `file_hash` after the algorithm prefix
/// (`sha256:`); a value without a prefix is used whole.
#[must_use]
pub fn nar_key(file_hash: &str, compression: &str) -> String {
    let digest = file_hash.split(':').nth(1).filter(|d| !d.is_empty()).unwrap_or(file_hash);
    if compression == DEFAULT_COMPRESSION {
        format!("nar/{digest}.nar")
    } else {
        format!("nar/{digest}.nar.{compression}")
    }
}

/// Whether the body was written or already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadResultKind {
    /// The body was written.
    Uploaded,
    /// A body with the same file hash already existed.
    Deduplicated,
}

/// Response to an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPathResult {
    /// Outcome for the body.
    pub kind: UploadResultKind,
    /// Size recorded for the stored body.
    pub file_size: u64,
}

/// Runs uploads against an object store, signing with the server key.
#[derive(Clone)]
pub struct UploadCoordinator {
    store: Arc<dyn ObjectStore>,
    signer: NarSigner,
    store_dir: String,
}

impl UploadCoordinator {
    /// Creates a coordinator for paths under [`DEFAULT_STORE_DIR`].
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, signer: NarSigner) -> Self {
        Self { store, signer, store_dir: DEFAULT_STORE_DIR.to_owned() }
    }

    /// Uses `store_dir` when stripping reference paths.
    #[must_use]
    pub fn with_store_dir(mut self, store_dir: impl Into<String>) -> Self {
        self.store_dir = store_dir.into();
        self
    }

    /// The server signer.
    #[must_use]
    pub fn signer(&self) -> &NarSigner {
        &self.signer
    }

    /// Parses a JSON upload header and uploads `nar`.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidFormat`] for a bad header, otherwise as
    /// [`upload`](Self::upload).
    pub async fn upload_from_header(&self, header: &str, nar: Bytes) -> Result<UploadPathResult> {
        let info = UploadPathNarInfo::from_header(header)?;
        self.upload(&info, nar).await
    }

    /// Stores `nar` unless its key already exists, then writes a narinfo
    /// signed with the server key.
    ///
    /// The narinfo is written on every call, including deduplicated ones.
    ///
    /// # Errors
    ///
    /// - [`CacheError::InvalidStorePathHash`] if `store_path_hash` is invalid
    ///   or is not the hash of `store_path` under the store directory
    /// - [`CacheError::InvalidFormat`] if a field cannot be written as a
    ///   narinfo line (see [`UploadPathNarInfo::check_fields`])
    /// - [`CacheError::EmptyBody`] if `nar` is empty
    /// - [`CacheError::Storage`] with the store's error, unretried
    #[tracing::instrument(
        skip(self, info, nar),
        fields(store_path_hash = %info.store_path_hash, nar_size = info.nar_size)
    )]
    pub async fn upload(&self, info: &UploadPathNarInfo, nar: Bytes) -> Result<UploadPathResult> {
        let hash = StorePathHash::new(info.store_path_hash.as_str())?;
        if extract_hash_in(&info.store_path, &self.store_dir) != Some(hash.as_str()) {
            tracing::debug!(store_path = %info.store_path, "store path does not match its hash");
            return Err(CacheError::invalid_store_path_hash(info.store_path.as_str()));
        }
        info.check_fields()?;
        if nar.is_empty() {
            return Err(CacheError::empty_body());
        }

        let compression = info.compression();
        let file_hash = info.file_hash();
        let file_size = info.file_size();
        let nar_key = nar_key(file_hash, compression);

        let kind = if self.store.head(&nar_key).await?.is_some() {
            tracing::debug!(nar_key = %nar_key, "NAR already stored, skipping body");
            UploadResultKind::Deduplicated
        } else {
            self.store.put(&nar_key, nar, NAR_CONTENT_TYPE).await?;
            UploadResultKind::Uploaded
        };

        if !info.sigs.is_empty() {
            tracing::debug!(count = info.sigs.len(), "discarding client signatures");
        }
        let sig = self.signer.sign_narinfo(
            &info.store_path,
            &info.nar_hash,
            info.nar_size,
            &info.references,
        );

        let narinfo = NarInfo {
            store_path: info.store_path.clone(),
            url: nar_key,
            compression: compression.to_owned(),
            file_hash: file_hash.to_owned(),
            file_size,
            nar_hash: info.nar_hash.clone(),
            nar_size: info.nar_size,
            references: info
                .references
                .iter()
                .map(|r| strip_store_dir(r, &self.store_dir).to_owned())
                .collect(),
            sig,
            deriver: info.deriver.clone().filter(|d| !d.is_empty()),
            system: info.system.clone().filter(|s| !s.is_empty()),
            ca: info.ca.clone().filter(|c| !c.is_empty()),
        };

        self.store
            .put(&hash.narinfo_key(), Bytes::from(narinfo.generate()), NARINFO_CONTENT_TYPE)
            .await?;

        tracing::debug!(kind = ?kind, file_size, "upload complete");
        Ok(UploadPathResult { kind, file_size })
    }
}

impl std::fmt::Debug for UploadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadCoordinator")
            .field("signer", &self.signer)
            .field("store_dir", &self.store_dir)
            .finish_non_exhaustive()
    }
}
