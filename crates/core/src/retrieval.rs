//! Reads of stored narinfos and NARs.
//!
//! Narinfo lookups validate the hash first, so a malformed request is
//! reported as [`CacheError::InvalidStorePathHash`] rather than a miss.

use nixcache_storage::{ObjectStore, StoredObject};

use crate::{
    error::{CacheError, Result},
    narinfo::NarInfo,
    store_path::StorePathHash,
};

/// Returns the narinfo text stored for `hash`.
///
/// # Errors
///
/// - [`CacheError::InvalidStorePathHash`] if `hash` is malformed
/// - [`CacheError::NotFound`] if no narinfo is stored
/// - [`CacheError::InvalidFormat`] if the stored body is not UTF-8
/// - [`CacheError::Storage`] if the store fails
#[tracing::instrument(skip(store))]
pub async fn get_narinfo<S>(store: &S, hash: &str) -> Result<String>
where
    S: ObjectStore + ?Sized,
{
    let key = StorePathHash::new(hash)?.narinfo_key();
    let object = store.get(&key).await?.ok_or_else(|| CacheError::not_found(key.as_str()))?;

    String::from_utf8(object.body.to_vec())
        .map_err(|e| CacheError::invalid_format(format!("stored narinfo is not UTF-8: {e}")))
}

/// Returns the parsed narinfo stored for `hash`.
///
/// # Errors
///
/// See [`get_narinfo`].
pub async fn get_parsed_narinfo<S>(store: &S, hash: &str) -> Result<NarInfo>
where
    S: ObjectStore + ?Sized,
{
    Ok(NarInfo::parse(&get_narinfo(store, hash).await?))
}

/// Returns whether a narinfo is stored for `hash`.
///
/// # Errors
///
/// - [`CacheError::InvalidStorePathHash`] if `hash` is malformed
/// - [`CacheError::Storage`] if the store fails
#[tracing::instrument(skip(store))]
pub async fn narinfo_exists<S>(store: &S, hash: &str) -> Result<bool>
where
    S: ObjectStore + ?Sized,
{
    let key = StorePathHash::new(hash)?.narinfo_key();
    Ok(store.head(&key).await?.is_some())
}

/// Returns the NAR stored as `nar/{file_name}`.
///
/// The returned object's [`content_type_or_default`](StoredObject::content_type_or_default)
/// falls back to `application/octet-stream`.
///
/// # Errors
///
/// - [`CacheError::NotFound`] if nothing is stored under the key
/// - [`CacheError::Storage`] if the store fails
#[tracing::instrument(skip(store))]
pub async fn get_nar<S>(store: &S, file_name: &str) -> Result<StoredObject>
where
    S: ObjectStore + ?Sized,
{
    let key = format!("nar/{file_name}");
    store.get(&key).await?.ok_or_else(|| CacheError::not_found(key))
}
