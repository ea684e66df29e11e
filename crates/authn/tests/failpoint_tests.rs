//! Fault injection around JWKS fetching.
//!
//! Run with `cargo test -p nixcache-authn --features failpoints`.
#![cfg(feature = "failpoints")]
#![allow(clippy::expect_used)]

use nixcache_authn::{
    assert_auth_error,
    oidc::verify_github_oidc_token,
    testutil::{TEST_KID, TEST_OWNER, create_signed_oidc_jwt, github_claims, test_jwks_cache},
    validation::parse_allowed_owners,
};

#[tokio::test]
async fn test_injected_fetch_failure_surfaces_as_unavailable() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("jwks-before-fetch", "return").expect("configure failpoint");

    let (cache, fetcher) = test_jwks_cache();
    let token = create_signed_oidc_jwt(&github_claims(TEST_OWNER), TEST_KID);
    let result = verify_github_oidc_token(&token, &parse_allowed_owners(TEST_OWNER), &cache).await;

    assert_auth_error!(result, JwksUnavailable);
    assert_eq!(fetcher.fetch_count(), 0, "failpoint fires before the fetcher is called");
    assert!(cache.snapshot().is_none());

    scenario.teardown();
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_snapshot() {
    let scenario = fail::FailScenario::setup();

    let (cache, _) = test_jwks_cache();
    let warm = cache.keys().await.expect("warm");

    fail::cfg("jwks-before-fetch", "return").expect("configure failpoint");
    let result = cache.refresh().await;
    assert_auth_error!(result, JwksUnavailable);

    let kept = cache.snapshot().expect("snapshot retained");
    assert!(std::sync::Arc::ptr_eq(&warm, &kept));

    fail::remove("jwks-before-fetch");
    scenario.teardown();
}
