//! Security-focused authentication tests.
//!
//! These tests drive the full OIDC pipeline and the composite gate with real
//! RS256 signatures: algorithm substitution, expired and future tokens,
//! foreign owners, wrong keys, tampered payloads, key rotation and JWKS
//! outages.
#![allow(clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use chrono::Utc;
use nixcache_authn::{
    AccessLevel, AuthConfig, AuthDecision, AuthGate, Grant, assert_auth_error,
    error::AuthError,
    jwks::Jwks,
    oidc::{verify_github_oidc_token, verify_github_oidc_token_at},
    testutil::{
        OTHER_RSA_PRIVATE_KEY, TEST_KID, TEST_OWNER, craft_raw_jwt, create_signed_oidc_jwt,
        create_signed_oidc_jwt_with_key, github_claims, test_jwk, test_jwks_cache,
    },
    validation::parse_allowed_owners,
};
use serde_json::json;

fn allowed() -> nixcache_authn::AllowedOwners {
    parse_allowed_owners("Octo-Org, other-org")
}

// ---------------------------------------------------------------------------
// OIDC verification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_valid_token_verifies() {
    let (cache, _) = test_jwks_cache();
    let token = create_signed_oidc_jwt(&github_claims(TEST_OWNER), TEST_KID);

    let claims = verify_github_oidc_token(&token, &allowed(), &cache).await.expect("valid token");

    assert_eq!(claims.repository_owner.as_deref(), Some(TEST_OWNER));
    assert_eq!(claims.repository.as_deref(), Some("octo-org/app"));
    assert_eq!(claims.git_ref.as_deref(), Some("refs/heads/main"));
}

#[tokio::test]
async fn test_owner_compared_case_insensitively() {
    let (cache, _) = test_jwks_cache();
    let token = create_signed_oidc_jwt(&github_claims("OCTO-ORG"), TEST_KID);

    let claims = verify_github_oidc_token(&token, &allowed(), &cache).await.expect("valid token");
    assert_eq!(claims.repository_owner.as_deref(), Some("OCTO-ORG"));
}

#[tokio::test]
async fn test_verifying_twice_fetches_jwks_once() {
    let (cache, fetcher) = test_jwks_cache();
    let token = create_signed_oidc_jwt(&github_claims(TEST_OWNER), TEST_KID);

    verify_github_oidc_token(&token, &allowed(), &cache).await.expect("first");
    verify_github_oidc_token(&token, &allowed(), &cache).await.expect("second");

    assert_eq!(fetcher.fetch_count(), 1);
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let (cache, _) = test_jwks_cache();
    let mut claims = github_claims(TEST_OWNER);
    claims["exp"] = json!(Utc::now().timestamp() - 10);
    let token = create_signed_oidc_jwt(&claims, TEST_KID);

    let result = verify_github_oidc_token(&token, &allowed(), &cache).await;
    assert_auth_error!(result, TokenExpired);
}

#[tokio::test]
async fn test_exp_equal_to_now_is_expired() {
    let (cache, _) = test_jwks_cache();
    let now = 1_900_000_000;
    let mut claims = github_claims(TEST_OWNER);
    claims["exp"] = json!(now);
    claims["nbf"] = json!(now - 60);
    let token = create_signed_oidc_jwt(&claims, TEST_KID);

    let result = verify_github_oidc_token_at(&token, &allowed(), &cache, now).await;
    assert_auth_error!(result, TokenExpired);

    let ok = verify_github_oidc_token_at(&token, &allowed(), &cache, now - 1).await;
    assert!(ok.is_ok(), "one second earlier the token is valid: {ok:?}");
}

#[tokio::test]
async fn test_future_nbf_rejected() {
    let (cache, _) = test_jwks_cache();
    let mut claims = github_claims(TEST_OWNER);
    claims["nbf"] = json!(Utc::now().timestamp() + 600);
    let token = create_signed_oidc_jwt(&claims, TEST_KID);

    let result = verify_github_oidc_token(&token, &allowed(), &cache).await;
    assert_auth_error!(result, TokenNotYetValid);
}

#[tokio::test]
async fn test_owner_outside_allow_list_rejected_without_fetching_keys() {
    let (cache, fetcher) = test_jwks_cache();
    let token = create_signed_oidc_jwt(&github_claims("evil-corp"), TEST_KID);

    let result = verify_github_oidc_token(&token, &allowed(), &cache).await;

    assert!(
        matches!(result, Err(AuthError::OwnerNotAllowed { ref owner }) if owner == "evil-corp"),
        "got {result:?}"
    );
    assert_eq!(fetcher.fetch_count(), 0);
}

#[tokio::test]
async fn test_missing_owner_claim_rejected() {
    let (cache, _) = test_jwks_cache();
    let mut claims = github_claims(TEST_OWNER);
    claims.as_object_mut().expect("object").remove("repository_owner");
    let token = create_signed_oidc_jwt(&claims, TEST_KID);

    let result = verify_github_oidc_token(&token, &allowed(), &cache).await;
    assert_auth_error!(result, MissingClaim);
}

#[tokio::test]
async fn test_wrong_issuer_rejected() {
    let (cache, _) = test_jwks_cache();
    let mut claims = github_claims(TEST_OWNER);
    claims["iss"] = json!("https://token.actions.githubusercontent.com.evil.example");
    let token = create_signed_oidc_jwt(&claims, TEST_KID);

    let result = verify_github_oidc_token(&token, &allowed(), &cache).await;
    assert_auth_error!(result, InvalidIssuer);
}

#[tokio::test]
async fn test_audience_array_containing_expected_accepted() {
    let (cache, _) = test_jwks_cache();
    let mut claims = github_claims(TEST_OWNER);
    claims["aud"] = json!(["sts.amazonaws.com", "api.flakehub.com"]);
    let token = create_signed_oidc_jwt(&claims, TEST_KID);

    assert!(verify_github_oidc_token(&token, &allowed(), &cache).await.is_ok());
}

#[tokio::test]
async fn test_wrong_audience_rejected() {
    let (cache, _) = test_jwks_cache();
    let mut claims = github_claims(TEST_OWNER);
    claims["aud"] = json!("https://github.com/octo-org");
    let token = create_signed_oidc_jwt(&claims, TEST_KID);

    let result = verify_github_oidc_token(&token, &allowed(), &cache).await;
    assert_auth_error!(result, InvalidAudience);
}

#[tokio::test]
async fn test_alg_none_rejected() {
    let (cache, fetcher) = test_jwks_cache();
    let token = craft_raw_jwt(&json!({"alg": "none", "kid": TEST_KID}), &github_claims(TEST_OWNER));

    let result = verify_github_oidc_token(&token, &allowed(), &cache).await;

    assert_auth_error!(result, UnsupportedAlgorithm);
    assert_eq!(fetcher.fetch_count(), 0);
}

#[tokio::test]
async fn test_hmac_algorithm_substitution_rejected() {
    let (cache, _) = test_jwks_cache();
    let mut token =
        craft_raw_jwt(&json!({"alg": "HS256", "kid": TEST_KID}), &github_claims(TEST_OWNER));
    token.push_str("c2lnbmF0dXJl");

    let result = verify_github_oidc_token(&token, &allowed(), &cache).await;
    assert_auth_error!(result, UnsupportedAlgorithm);
}

#[tokio::test]
async fn test_missing_alg_rejected() {
    let (cache, _) = test_jwks_cache();
    let token = craft_raw_jwt(&json!({"kid": TEST_KID}), &github_claims(TEST_OWNER));

    let result = verify_github_oidc_token(&token, &allowed(), &cache).await;
    assert_auth_error!(result, UnsupportedAlgorithm);
}

#[tokio::test]
async fn test_missing_kid_rejected() {
    let (cache, _) = test_jwks_cache();
    let token = craft_raw_jwt(&json!({"alg": "RS256", "typ": "JWT"}), &github_claims(TEST_OWNER));

    let result = verify_github_oidc_token(&token, &allowed(), &cache).await;
    assert_auth_error!(result, MissingKeyId);
}

#[tokio::test]
async fn test_malformed_tokens_rejected() {
    let (cache, fetcher) = test_jwks_cache();
    let valid = create_signed_oidc_jwt(&github_claims(TEST_OWNER), TEST_KID);

    for token in [
        String::new(),
        "not-a-jwt".to_owned(),
        "only.two".to_owned(),
        format!("{valid}.extra"),
        "!!!.@@@.###".to_owned(),
        format!("{}.e30.", URL_SAFE_NO_PAD.encode("not json")),
    ] {
        let result = verify_github_oidc_token(&token, &allowed(), &cache).await;
        assert_auth_error!(result, MalformedToken, format!("token {token:?}"));
    }
    assert_eq!(fetcher.fetch_count(), 0);
}

#[tokio::test]
async fn test_signature_from_other_key_rejected() {
    let (cache, _) = test_jwks_cache();
    let token =
        create_signed_oidc_jwt_with_key(OTHER_RSA_PRIVATE_KEY, &github_claims(TEST_OWNER), TEST_KID);

    let result = verify_github_oidc_token(&token, &allowed(), &cache).await;
    assert_auth_error!(result, InvalidSignature);
}

#[tokio::test]
async fn test_tampered_payload_rejected() {
    let (cache, _) = test_jwks_cache();
    let token = create_signed_oidc_jwt(&github_claims(TEST_OWNER), TEST_KID);
    let parts: Vec<&str> = token.split('.').collect();

    let mut forged = github_claims("other-org");
    forged["repository"] = json!("other-org/app");
    let forged_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).expect("json"));
    let tampered = format!("{}.{}.{}", parts[0], forged_b64, parts[2]);

    let result = verify_github_oidc_token(&tampered, &allowed(), &cache).await;
    assert_auth_error!(result, InvalidSignature);
}

#[tokio::test]
async fn test_truncated_signature_rejected() {
    let (cache, _) = test_jwks_cache();
    let token = create_signed_oidc_jwt(&github_claims(TEST_OWNER), TEST_KID);
    let truncated = &token[..token.len() - 10];

    let result = verify_github_oidc_token(truncated, &allowed(), &cache).await;
    assert_auth_error!(result, InvalidSignature);
}

#[tokio::test]
async fn test_unknown_kid_refreshes_once_then_fails() {
    let (cache, fetcher) = test_jwks_cache();
    cache.keys().await.expect("warm");
    let token = create_signed_oidc_jwt(&github_claims(TEST_OWNER), "unknown-kid");

    let result = verify_github_oidc_token(&token, &allowed(), &cache).await;

    assert!(
        matches!(result, Err(AuthError::KeyNotFound { ref kid }) if kid == "unknown-kid"),
        "got {result:?}"
    );
    assert_eq!(fetcher.fetch_count(), 2, "warm fetch plus exactly one forced refresh");
}

#[tokio::test]
async fn test_key_rotation_picked_up_by_forced_refresh() {
    let (cache, fetcher) = test_jwks_cache();
    cache.keys().await.expect("warm");
    fetcher.set_jwks(Jwks { keys: vec![test_jwk("rotated-kid")] });
    let token = create_signed_oidc_jwt(&github_claims(TEST_OWNER), "rotated-kid");

    let claims = verify_github_oidc_token(&token, &allowed(), &cache).await;

    assert!(claims.is_ok(), "rotated key should be found after refresh: {claims:?}");
    assert_eq!(fetcher.fetch_count(), 2);
}

#[tokio::test]
async fn test_jwks_outage_is_unavailable_not_denial() {
    let (cache, fetcher) = test_jwks_cache();
    fetcher.set_failing(true);
    let token = create_signed_oidc_jwt(&github_claims(TEST_OWNER), TEST_KID);

    let result = verify_github_oidc_token(&token, &allowed(), &cache).await;

    assert_auth_error!(result, JwksUnavailable);
    assert_eq!(fetcher.fetch_count(), 1, "fetch failures are not retried");
}

// ---------------------------------------------------------------------------
// Composite gate
// ---------------------------------------------------------------------------

fn gate_with(owners: &str) -> (AuthGate, Arc<nixcache_authn::testutil::StaticJwksFetcher>) {
    let (cache, fetcher) = test_jwks_cache();
    let config = AuthConfig::builder()
        .read_token("read-secret")
        .write_token("write-secret")
        .allowed_owners(owners)
        .build();
    (AuthGate::new(&config, cache), fetcher)
}

#[tokio::test]
async fn test_gate_without_header_is_unauthorized() {
    let (gate, _) = gate_with("octo-org");
    let decision = gate.authorize(None, AccessLevel::Read).await.expect("decision");
    assert_eq!(decision, AuthDecision::Unauthorized);
}

#[tokio::test]
async fn test_gate_unknown_scheme_is_unauthorized() {
    let (gate, _) = gate_with("octo-org");
    let decision = gate.authorize(Some("Digest abc"), AccessLevel::Read).await.expect("decision");
    assert_eq!(decision, AuthDecision::Unauthorized);
}

#[tokio::test]
async fn test_gate_write_token_grants_read_and_write() {
    let (gate, fetcher) = gate_with("octo-org");
    for level in [AccessLevel::Read, AccessLevel::Write] {
        let decision = gate.authorize(Some("Bearer write-secret"), level).await.expect("decision");
        assert_eq!(decision, AuthDecision::Granted(Grant::Legacy));
    }
    assert_eq!(fetcher.fetch_count(), 0, "legacy success never touches OIDC");
}

#[tokio::test]
async fn test_gate_read_token_does_not_grant_write() {
    let (gate, _) = gate_with("");
    let read = gate.authorize(Some("Bearer read-secret"), AccessLevel::Read).await.expect("read");
    let write = gate.authorize(Some("Bearer read-secret"), AccessLevel::Write).await.expect("write");

    assert_eq!(read, AuthDecision::Granted(Grant::Legacy));
    assert_eq!(write, AuthDecision::Forbidden);
}

#[tokio::test]
async fn test_gate_accepts_basic_auth_password() {
    let (gate, _) = gate_with("");
    let header = format!("Basic {}", STANDARD.encode("nix:write-secret"));

    let decision = gate.authorize(Some(&header), AccessLevel::Write).await.expect("decision");
    assert_eq!(decision, AuthDecision::Granted(Grant::Legacy));
}

#[tokio::test]
async fn test_gate_oidc_token_granted_when_owner_allowed() {
    let (gate, _) = gate_with("octo-org");
    let token = create_signed_oidc_jwt(&github_claims(TEST_OWNER), TEST_KID);
    let header = format!("Bearer {token}");

    let decision = gate.authorize(Some(&header), AccessLevel::Write).await.expect("decision");

    match decision {
        AuthDecision::Granted(Grant::Oidc(claims)) => {
            assert_eq!(claims.repository_owner.as_deref(), Some(TEST_OWNER));
        },
        other => panic!("expected OIDC grant, got {other:?}"),
    }
}

#[tokio::test]
async fn test_gate_skips_oidc_when_allow_list_empty() {
    let (gate, fetcher) = gate_with(" , ");
    let token = create_signed_oidc_jwt(&github_claims(TEST_OWNER), TEST_KID);
    let header = format!("Bearer {token}");

    let decision = gate.authorize(Some(&header), AccessLevel::Read).await.expect("decision");

    assert_eq!(decision, AuthDecision::Forbidden);
    assert_eq!(fetcher.fetch_count(), 0);
}

#[tokio::test]
async fn test_gate_rejected_oidc_token_is_forbidden() {
    let (gate, _) = gate_with("octo-org");
    let mut claims = github_claims(TEST_OWNER);
    claims["exp"] = json!(Utc::now().timestamp() - 1);
    let header = format!("Bearer {}", create_signed_oidc_jwt(&claims, TEST_KID));

    let decision = gate.authorize(Some(&header), AccessLevel::Read).await.expect("decision");
    assert_eq!(decision, AuthDecision::Forbidden);
}

#[tokio::test]
async fn test_gate_garbage_token_is_forbidden() {
    let (gate, _) = gate_with("octo-org");
    let decision = gate.authorize(Some("Bearer nope"), AccessLevel::Read).await.expect("decision");
    assert_eq!(decision, AuthDecision::Forbidden);
}

#[tokio::test]
async fn test_gate_surfaces_jwks_outage_as_error() {
    let (gate, fetcher) = gate_with("octo-org");
    fetcher.set_failing(true);
    let header = format!("Bearer {}", create_signed_oidc_jwt(&github_claims(TEST_OWNER), TEST_KID));

    let result = gate.authorize(Some(&header), AccessLevel::Read).await;

    assert!(result.as_ref().is_err_and(AuthError::is_unavailable), "got {result:?}");
}
