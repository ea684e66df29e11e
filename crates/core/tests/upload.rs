//! End-to-end upload flow against recording and failing stores.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use bytes::Bytes;
use nixcache_core::{
    CacheError, ErrorKind, NarInfo, UploadCoordinator, UploadResultKind, assert_cache_error,
    retrieval,
    testutil::{TEST_PUBLIC_KEY, sample_upload, test_hash, test_signer},
    upload::NAR_CONTENT_TYPE,
    verify,
};
use nixcache_storage::{
    ObjectStore, StorageError,
    testutil::{FailOn, FailingObjectStore, ObjectOp, RecordingObjectStore},
};

fn coordinator(store: &RecordingObjectStore) -> UploadCoordinator {
    UploadCoordinator::new(Arc::new(store.clone()), test_signer())
}

#[tokio::test]
async fn test_first_upload_writes_body_then_narinfo() {
    let store = RecordingObjectStore::new();
    let info = sample_upload(1, "hello");

    let result = coordinator(&store).upload(&info, Bytes::from_static(b"nar!")).await.unwrap();

    assert_eq!(result.kind, UploadResultKind::Uploaded);
    assert_eq!(result.file_size, 4);

    let nar_key = info.nar_key();
    let narinfo_key = format!("{}.narinfo", info.store_path_hash);
    assert_eq!(store.ops(), vec![
        ObjectOp::Head(nar_key.clone()),
        ObjectOp::Put { key: nar_key, content_type: NAR_CONTENT_TYPE.to_owned(), size: 4 },
        ObjectOp::Put {
            key: narinfo_key.clone(),
            content_type: "text/x-nix-narinfo".to_owned(),
            size: store.inner().get(&narinfo_key).await.unwrap().unwrap().body.len(),
        },
    ]);
}

#[tokio::test]
async fn test_identical_content_uploaded_twice_writes_body_once() {
    let store = RecordingObjectStore::new();
    let coordinator = coordinator(&store);
    let info = sample_upload(1, "hello");
    let narinfo_key = format!("{}.narinfo", info.store_path_hash);

    let first = coordinator.upload(&info, Bytes::from_static(b"nar!")).await.unwrap();
    assert_eq!(store.put_count(&info.nar_key()), 1);
    assert_eq!(store.put_count(&narinfo_key), 1);

    let second = coordinator.upload(&info, Bytes::from_static(b"nar!")).await.unwrap();

    assert_eq!(first.kind, UploadResultKind::Uploaded);
    assert_eq!(second.kind, UploadResultKind::Deduplicated);
    assert_eq!(store.put_count(&info.nar_key()), 1, "dedup skips the body");
    assert_eq!(store.put_count(&narinfo_key), 2, "narinfo is written on every call");
}

#[tokio::test]
async fn test_different_paths_sharing_content_share_the_body() {
    let store = RecordingObjectStore::new();
    let coordinator = coordinator(&store);
    let a = sample_upload(1, "a");
    let mut b = sample_upload(2, "b");
    b.nar_hash = a.nar_hash.clone();

    coordinator.upload(&a, Bytes::from_static(b"same")).await.unwrap();
    let result = coordinator.upload(&b, Bytes::from_static(b"same")).await.unwrap();

    assert_eq!(result.kind, UploadResultKind::Deduplicated);
    assert_eq!(store.put_keys(), vec![
        a.nar_key(),
        format!("{}.narinfo", a.store_path_hash),
        format!("{}.narinfo", b.store_path_hash),
    ]);
}

#[tokio::test]
async fn test_stored_narinfo_is_signed_by_server_over_full_references() {
    let store = RecordingObjectStore::new();
    let mut info = sample_upload(3, "tool");
    info.sigs = vec!["client-key:Zm9yZ2VkIHNpZ25hdHVyZQ==".to_owned()];

    coordinator(&store).upload(&info, Bytes::from_static(b"nar!")).await.unwrap();
    let narinfo = retrieval::get_parsed_narinfo(store.inner(), &info.store_path_hash).await.unwrap();

    assert!(narinfo.sig.starts_with("test-cache-1:"));
    assert!(!narinfo.sig.contains("Zm9yZ2Vk"), "client signatures are discarded");
    assert!(narinfo.references.iter().all(|r| !r.starts_with("/nix/store/")));
    assert_eq!(narinfo.references.len(), 2);

    let fingerprint = narinfo.fingerprint("/nix/store");
    assert!(fingerprint.ends_with(&info.references.join(",")));
    assert!(verify(TEST_PUBLIC_KEY, &narinfo.sig, &fingerprint).unwrap());
}

#[tokio::test]
async fn test_narinfo_fields_follow_header() {
    let store = RecordingObjectStore::new();
    let mut info = sample_upload(4, "zipped");
    info.compression = Some("xz".to_owned());
    info.file_hash = Some(format!("sha256:{}", test_hash(99)));
    info.file_size = Some(2);
    info.deriver = Some(format!("{}-zipped.drv", test_hash(98)));
    info.ca = Some(String::new());

    let result = coordinator(&store).upload(&info, Bytes::from_static(b"xz")).await.unwrap();
    assert_eq!(result.file_size, 2);

    let text = retrieval::get_narinfo(store.inner(), &info.store_path_hash).await.unwrap();
    let narinfo = NarInfo::parse(&text);

    assert_eq!(narinfo.url, format!("nar/{}.nar.xz", test_hash(99)));
    assert_eq!(narinfo.compression, "xz");
    assert_eq!(narinfo.file_hash, format!("sha256:{}", test_hash(99)));
    assert_eq!(narinfo.file_size, 2);
    assert_eq!(narinfo.nar_hash, info.nar_hash);
    assert_eq!(narinfo.nar_size, info.nar_size);
    assert_eq!(narinfo.system.as_deref(), Some("x86_64-linux"));
    assert_eq!(narinfo.deriver, info.deriver);
    assert_eq!(narinfo.ca, None);
    assert!(!text.contains("CA:"));

    let nar = retrieval::get_nar(store.inner(), &format!("{}.nar.xz", test_hash(99))).await.unwrap();
    assert_eq!(nar.content_type_or_default(), NAR_CONTENT_TYPE);
}

#[tokio::test]
async fn test_upload_from_header() {
    let store = RecordingObjectStore::new();
    let info = sample_upload(5, "json");
    let header = serde_json::to_string(&info).unwrap();

    let result = coordinator(&store)
        .upload_from_header(&header, Bytes::from_static(b"nar!"))
        .await
        .unwrap();

    assert_eq!(serde_json::to_string(&result).unwrap(), r#"{"kind":"Uploaded","file_size":4}"#);
}

#[tokio::test]
async fn test_rejected_uploads_touch_no_storage() {
    let store = RecordingObjectStore::new();
    let coordinator = coordinator(&store);

    let result = coordinator.upload_from_header("{not json", Bytes::from_static(b"x")).await;
    assert_cache_error!(result, InvalidFormat);

    let mut bad_hash = sample_upload(6, "bad");
    bad_hash.store_path_hash = "abc123".to_owned();
    let result = coordinator.upload(&bad_hash, Bytes::from_static(b"x")).await;
    assert_cache_error!(result, InvalidStorePathHash);

    let result = coordinator.upload(&sample_upload(6, "empty"), Bytes::new()).await;
    assert_cache_error!(result, EmptyBody);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Format);

    assert!(store.ops().is_empty());
}

#[tokio::test]
async fn test_head_failure_propagates_unmodified() {
    let store = Arc::new(FailingObjectStore::new(FailOn::Head, StorageError::timeout()));
    let coordinator = UploadCoordinator::new(store.clone(), test_signer());

    let result = coordinator.upload(&sample_upload(7, "x"), Bytes::from_static(b"nar!")).await;

    assert!(matches!(result, Err(CacheError::Storage(StorageError::Timeout))), "got {result:?}");
    assert!(store.inner().is_empty());
}

#[tokio::test]
async fn test_put_failure_leaves_no_narinfo() {
    let store = Arc::new(FailingObjectStore::new(
        FailOn::Put,
        StorageError::connection("bucket unreachable"),
    ));
    let coordinator = UploadCoordinator::new(store.clone(), test_signer());

    let result = coordinator.upload(&sample_upload(8, "x"), Bytes::from_static(b"nar!")).await;

    let Err(err) = result else { panic!("expected failure") };
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(matches!(err, CacheError::Storage(ref e) if e.is_transient()));
    assert!(store.inner().is_empty());
}

#[tokio::test]
async fn test_custom_store_dir_strips_its_own_prefix() {
    let store = RecordingObjectStore::new();
    let coordinator = coordinator(&store).with_store_dir("/gnu/store/");
    let mut info = sample_upload(9, "guix");
    info.store_path = format!("/gnu/store/{}-guix", test_hash(9));
    info.references = vec![
        format!("/gnu/store/{}-guile", test_hash(10)),
        format!("/nix/store/{}-other", test_hash(11)),
    ];

    coordinator.upload(&info, Bytes::from_static(b"nar!")).await.unwrap();
    let narinfo = retrieval::get_parsed_narinfo(store.inner(), &info.store_path_hash).await.unwrap();

    assert_eq!(narinfo.references, vec![
        format!("{}-guile", test_hash(10)),
        format!("/nix/store/{}-other", test_hash(11)),
    ]);
}

#[tokio::test]
async fn test_concurrent_identical_uploads_converge() {
    let store = RecordingObjectStore::new();
    let coordinator = Arc::new(coordinator(&store));
    let info = sample_upload(12, "race");

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let coordinator = Arc::clone(&coordinator);
        let info = info.clone();
        tasks.spawn(async move { coordinator.upload(&info, Bytes::from_static(b"nar!")).await });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.expect("task").expect("upload");
    }

    let body = store.inner().get(&info.nar_key()).await.unwrap().unwrap();
    assert_eq!(body.body, Bytes::from_static(b"nar!"));
    assert_eq!(store.put_count(&format!("{}.narinfo", info.store_path_hash)), 8);
    assert!(store.put_count(&info.nar_key()) >= 1);
}

#[tokio::test]
async fn test_injected_lines_never_reach_stored_narinfo() {
    let store = RecordingObjectStore::new();
    let coordinator = coordinator(&store);

    let mut ca = sample_upload(13, "ca");
    ca.ca = Some("fixed:sha256:x\nSig: attacker-1:AAAA".to_owned());
    let mut system = sample_upload(13, "system");
    system.system = Some("x86_64-linux\r\nSig: attacker-1:AAAA".to_owned());
    let mut reference = sample_upload(13, "reference");
    reference.references.push(format!("/nix/store/{}-a b", test_hash(14)));

    for info in [ca, system, reference] {
        let result = coordinator.upload(&info, Bytes::from_static(b"nar!")).await;
        assert_cache_error!(result, InvalidFormat);
    }
    assert!(store.ops().is_empty(), "rejected before any storage call");
}

#[tokio::test]
async fn test_stored_signature_is_always_the_servers() {
    let store = RecordingObjectStore::new();
    let mut info = sample_upload(15, "plain");
    info.ca = Some("fixed:r:sha256:abc".to_owned());

    coordinator(&store).upload(&info, Bytes::from_static(b"nar!")).await.unwrap();
    let text = retrieval::get_narinfo(store.inner(), &info.store_path_hash).await.unwrap();

    assert_eq!(text.lines().filter(|l| l.starts_with("Sig:")).count(), 1);
    let narinfo = NarInfo::parse(&text);
    assert!(narinfo.sig.starts_with("test-cache-1:"));
    assert_eq!(narinfo.ca.as_deref(), Some("fixed:r:sha256:abc"));
}

#[tokio::test]
async fn test_store_path_must_match_its_hash() {
    let store = RecordingObjectStore::new();
    let coordinator = coordinator(&store);

    let mut other_path = sample_upload(16, "victim");
    other_path.store_path = format!("/nix/store/{}-victim", test_hash(17));
    let mut outside_store = sample_upload(16, "victim");
    outside_store.store_path = format!("/tmp/{}-victim", test_hash(16));
    let mut bad_name = sample_upload(16, "victim");
    bad_name.store_path = format!("/nix/store/{}-", test_hash(16));

    for info in [other_path, outside_store, bad_name] {
        let result = coordinator.upload(&info, Bytes::from_static(b"nar!")).await;
        assert_cache_error!(result, InvalidStorePathHash);
    }
    assert!(store.ops().is_empty());
}
