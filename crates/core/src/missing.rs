//! Batch existence check for narinfos.

use std::sync::Arc;

use nixcache_storage::{ObjectStore, StorageError};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::error::Result;

/// Request body of the missing-paths check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetMissingPathsRequest {
    /// Target cache name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<String>,
    /// Hashes to probe.
    pub store_path_hashes: Vec<String>,
}

/// Response body of the missing-paths check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetMissingPathsResponse {
    /// Requested hashes with no narinfo, in request order.
    pub missing_paths: Vec<String>,
}

/// Returns the hashes in `hashes` whose `{hash}.narinfo` is absent.
///
/// Probes run concurrently; the result keeps the input order. Hashes are not
/// validated, a malformed one simply has no narinfo.
///
/// # Errors
///
/// Returns [`CacheError::Storage`](crate::CacheError::Storage) with the first
/// probe failure observed. Outstanding probes are cancelled.
#[tracing::instrument(skip(store, hashes), fields(count = hashes.len()))]
pub async fn get_missing_paths<S>(store: &Arc<S>, hashes: &[String]) -> Result<Vec<String>>
where
    S: ObjectStore + ?Sized + 'static,
{
    let mut probes = JoinSet::new();
    for (index, hash) in hashes.iter().enumerate() {
        let store = Arc::clone(store);
        let key = format!("{hash}.narinfo");
        probes.spawn(async move { (index, store.head(&key).await) });
    }

    let mut present = vec![false; hashes.len()];
    while let Some(joined) = probes.join_next().await {
        let (index, probe) = joined
            .map_err(|e| StorageError::internal_with_source("existence probe task failed", e))?;
        present[index] = probe?.is_some();
    }

    let missing: Vec<String> = hashes
        .iter()
        .zip(present)
        .filter_map(|(hash, present)| (!present).then(|| hash.clone()))
        .collect();

    tracing::debug!(missing = missing.len(), "missing paths computed");
    Ok(missing)
}

/// Answers a [`GetMissingPathsRequest`].
///
/// # Errors
///
/// See [`get_missing_paths`].
pub async fn check_missing_paths<S>(
    store: &Arc<S>,
    request: &GetMissingPathsRequest,
) -> Result<GetMissingPathsResponse>
where
    S: ObjectStore + ?Sized + 'static,
{
    let missing_paths = get_missing_paths(store, &request.store_path_hashes).await?;
    Ok(GetMissingPathsResponse { missing_paths })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use bytes::Bytes;
    use nixcache_storage::MemoryObjectStore;

    use super::*;

    fn hashes(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[tokio::test]
    async fn test_only_absent_hashes_in_input_order() {
        let store = Arc::new(MemoryObjectStore::new());
        store.put("abc123.narinfo", Bytes::from_static(b"x"), "text/x-nix-narinfo").await.unwrap();

        let missing =
            get_missing_paths(&store, &hashes(&["abc123", "def456", "ghi789"])).await.unwrap();

        assert_eq!(missing, vec!["def456", "ghi789"]);
    }

    #[tokio::test]
    async fn test_empty_request() {
        let store = Arc::new(MemoryObjectStore::new());
        assert!(get_missing_paths(&store, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicates_are_reported_per_occurrence() {
        let store = Arc::new(MemoryObjectStore::new());
        let missing = get_missing_paths(&store, &hashes(&["a", "b", "a"])).await.unwrap();
        assert_eq!(missing, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_request_json() {
        let request: GetMissingPathsRequest =
            serde_json::from_str(r#"{"store_path_hashes":["a","b"]}"#).unwrap();
        assert_eq!(request.cache, None);
        assert_eq!(request.store_path_hashes, vec!["a", "b"]);

        let response = GetMissingPathsResponse { missing_paths: vec!["b".into()] };
        assert_eq!(serde_json::to_string(&response).unwrap(), r#"{"missing_paths":["b"]}"#);
    }
}
