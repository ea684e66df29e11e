//! Verifies that the authorization path is traced end to end.

#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};

use nixcache_authn::{
    AccessLevel, AuthConfig, AuthGate,
    testutil::{TEST_KID, TEST_OWNER, create_signed_oidc_jwt, github_claims, test_jwks_cache},
};
use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};

#[derive(Clone, Default)]
struct SpanCollector {
    spans: Arc<Mutex<Vec<String>>>,
}

impl<S> tracing_subscriber::Layer<S> for SpanCollector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        _attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            self.spans.lock().expect("lock poisoned").push(span.name().to_owned());
        }
    }
}

#[tokio::test]
async fn oidc_authorization_creates_nested_spans() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector));

    let (cache, _) = test_jwks_cache();
    let config = AuthConfig::builder()
        .read_token("r")
        .write_token("w")
        .allowed_owners(TEST_OWNER)
        .build();
    let gate = AuthGate::new(&config, cache);
    let header = format!("Bearer {}", create_signed_oidc_jwt(&github_claims(TEST_OWNER), TEST_KID));

    let decision = gate.authorize(Some(&header), AccessLevel::Write).await.expect("decision");
    assert!(decision.is_granted());

    let recorded = spans.lock().expect("lock poisoned");
    for name in ["authorize", "verify_github_oidc_token_at", "find_key", "keys", "refresh"] {
        assert!(recorded.iter().any(|s| s == name), "expected a '{name}' span, got: {recorded:?}");
    }
}

#[tokio::test]
async fn legacy_authorization_skips_key_lookup() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector));

    let (cache, _) = test_jwks_cache();
    let config = AuthConfig::builder().read_token("r").write_token("w").build();
    let gate = AuthGate::new(&config, cache);

    let decision = gate.authorize(Some("Bearer w"), AccessLevel::Write).await.expect("decision");
    assert!(decision.is_granted());

    let recorded = spans.lock().expect("lock poisoned");
    assert!(recorded.iter().any(|s| s == "authorize"));
    assert!(!recorded.iter().any(|s| s == "find_key"), "got: {recorded:?}");
}
