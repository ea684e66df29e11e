//! Conformance test suite for [`ObjectStore`] implementations.
//!
//! Each function checks one aspect of the trait contract against a fresh
//! store. Integration tests call them one by one for fine-grained failure
//! reporting.
//!
//! ```no_run
//! use nixcache_storage::{MemoryObjectStore, conformance};
//!
//! #[tokio::test]
//! async fn head_returns_none_for_missing_key() {
//!     conformance::head_returns_none_for_missing_key(&MemoryObjectStore::new()).await;
//! }
//! ```
//!
//! | Category | Contract aspect |
//! |----------|-----------------|
//! | Existence | `head` reports presence, size and content type |
//! | Read/write | `get` returns exactly what `put` wrote |
//! | Idempotence | repeated identical writes are harmless |
//! | Concurrency | parallel writers and probers through a shared handle |

use std::sync::Arc;

use bytes::Bytes;

use crate::backend::ObjectStore;

// ============================================================================
// Existence
// ============================================================================

/// `head` on a nonexistent key returns `Ok(None)`.
pub async fn head_returns_none_for_missing_key<S: ObjectStore>(store: &S) {
    let result = store.head("missing.narinfo").await;
    assert!(result.is_ok(), "head should not error on missing key: {result:?}");
    assert_eq!(result.expect("checked above"), None);
}

/// `head` after `put` reports the body size and content type.
pub async fn head_reports_size_and_content_type<S: ObjectStore>(store: &S) {
    store
        .put("nar/abc.nar.xz", Bytes::from_static(b"0123456789"), "application/x-nix-nar")
        .await
        .expect("put should succeed");

    let meta = store.head("nar/abc.nar.xz").await.expect("head").expect("object should exist");
    assert_eq!(meta.size, 10);
    assert_eq!(meta.content_type.as_deref(), Some("application/x-nix-nar"));
}

/// `exists` agrees with `head`.
pub async fn exists_matches_head<S: ObjectStore>(store: &S) {
    assert!(!store.exists("k.narinfo").await.expect("exists"));
    store.put("k.narinfo", Bytes::from_static(b"x"), "text/x-nix-narinfo").await.expect("put");
    assert!(store.exists("k.narinfo").await.expect("exists"));
}

/// Keys are matched exactly; a prefix is not a hit.
pub async fn keys_are_exact<S: ObjectStore>(store: &S) {
    store.put("nar/abc.nar.xz", Bytes::from_static(b"x"), "application/x-nix-nar").await.expect("put");
    assert_eq!(store.head("nar/abc.nar").await.expect("head"), None);
    assert_eq!(store.head("nar/abc").await.expect("head"), None);
}

// ============================================================================
// Read/write
// ============================================================================

/// `get` on a nonexistent key returns `Ok(None)`.
pub async fn get_returns_none_for_missing_key<S: ObjectStore>(store: &S) {
    let result = store.get("nar/missing.nar").await.expect("get should not error");
    assert_eq!(result, None);
}

/// `put` then `get` round-trips body, content type and size.
pub async fn put_then_get_returns_object<S: ObjectStore>(store: &S) {
    let body = Bytes::from_static(b"StorePath: /nix/store/x\n");
    store.put("x.narinfo", body.clone(), "text/x-nix-narinfo").await.expect("put");

    let obj = store.get("x.narinfo").await.expect("get").expect("object should exist");
    assert_eq!(obj.body, body);
    assert_eq!(obj.size, body.len() as u64);
    assert_eq!(obj.content_type.as_deref(), Some("text/x-nix-narinfo"));
}

/// A second `put` replaces the previous body.
pub async fn put_overwrites_existing<S: ObjectStore>(store: &S) {
    store.put("k.narinfo", Bytes::from_static(b"old"), "text/x-nix-narinfo").await.expect("put");
    store.put("k.narinfo", Bytes::from_static(b"newer"), "text/x-nix-narinfo").await.expect("put");

    let obj = store.get("k.narinfo").await.expect("get").expect("present");
    assert_eq!(obj.body, Bytes::from_static(b"newer"));
    assert_eq!(obj.size, 5);
}

/// Zero-length bodies are stored, not treated as absent.
pub async fn empty_body_is_stored<S: ObjectStore>(store: &S) {
    store.put("empty", Bytes::new(), "application/octet-stream").await.expect("put");
    let meta = store.head("empty").await.expect("head").expect("present");
    assert_eq!(meta.size, 0);
}

/// Large bodies (4 MiB) round-trip.
pub async fn large_body_roundtrip<S: ObjectStore>(store: &S) {
    let big = Bytes::from(vec![0xA5u8; 4 * 1024 * 1024]);
    store.put("nar/big.nar", big.clone(), "application/x-nix-nar").await.expect("put");
    let obj = store.get("nar/big.nar").await.expect("get").expect("present");
    assert_eq!(obj.body.len(), big.len());
    assert_eq!(obj.body, big);
}

// ============================================================================
// Idempotence
// ============================================================================

/// Writing identical bytes twice leaves the same object behind.
pub async fn identical_put_is_idempotent<S: ObjectStore>(store: &S) {
    let body = Bytes::from_static(b"same bytes");
    store.put("nar/h.nar", body.clone(), "application/x-nix-nar").await.expect("first put");
    store.put("nar/h.nar", body.clone(), "application/x-nix-nar").await.expect("second put");

    let obj = store.get("nar/h.nar").await.expect("get").expect("present");
    assert_eq!(obj.body, body);
}

// ============================================================================
// Concurrency
// ============================================================================

/// Parallel writers of distinct keys all land.
pub async fn concurrent_puts_distinct_keys<S: ObjectStore + 'static>(store: Arc<S>) {
    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..32 {
        let store = Arc::clone(&store);
        tasks.spawn(async move {
            let key = format!("nar/{i:02}.nar");
            store.put(&key, Bytes::from(vec![i as u8; 8]), "application/x-nix-nar").await
        });
    }
    while let Some(res) = tasks.join_next().await {
        res.expect("task panicked").expect("put should succeed");
    }

    for i in 0..32 {
        let key = format!("nar/{i:02}.nar");
        assert!(store.exists(&key).await.expect("exists"), "{key} should exist");
    }
}

/// Parallel writers of the same key with the same bytes converge.
pub async fn concurrent_identical_puts_converge<S: ObjectStore + 'static>(store: Arc<S>) {
    let body = Bytes::from_static(b"content-addressed");
    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..16 {
        let store = Arc::clone(&store);
        let body = body.clone();
        tasks.spawn(async move { store.put("nar/same.nar", body, "application/x-nix-nar").await });
    }
    while let Some(res) = tasks.join_next().await {
        res.expect("task panicked").expect("put should succeed");
    }

    let obj = store.get("nar/same.nar").await.expect("get").expect("present");
    assert_eq!(obj.body, body);
}
