//! End-to-end resolution tests: precedence, per-transport failure policy,
//! silent refresh, and replay detection across the codec, store, and
//! resolver working together.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use doorman::config::AuthConfig;
use doorman::cookies::{issue_cookies, rotation_cookies, CookieSettings};
use doorman::error::AuthError;
use doorman::identity::{
    CredentialSource, IdentityResolver, RefreshDecision, RequestContext, Resolution,
};
use doorman::store::{Clock, SessionStore};
use doorman::token::{TokenClaims, TokenCodec, TokenKind};

fn codec() -> TokenCodec {
    let cfg = AuthConfig { secret: Some("integration-secret".into()), ..AuthConfig::default() };
    TokenCodec::from_config(&cfg).unwrap().unwrap()
}

fn resolver() -> IdentityResolver {
    IdentityResolver::new(Some(codec()), SessionStore::in_memory())
}

/// An access token whose expiry is already in the past, signed with our key.
fn expired_access(codec: &TokenCodec, subject: &str, family: &str) -> String {
    let now = Utc::now().timestamp();
    codec
        .encode(&TokenClaims {
            sub: subject.to_string(),
            iss: "doorman".to_string(),
            iat: now - 1_800,
            exp: now - 600,
            fam: family.to_string(),
            kind: TokenKind::Access,
            sid: None,
        })
        .unwrap()
}

fn assert_rejected(resolution: &Resolution, expected: AuthError) {
    match resolution {
        Resolution::Rejected(err) => assert_eq!(*err, expected),
        other => panic!("expected rejection with {expected:?}, got {other:?}"),
    }
}

#[tokio::test]
async fn authorization_header_wins_over_cookie() {
    let codec = codec();
    let resolver = IdentityResolver::new(Some(codec.clone()), SessionStore::in_memory());
    let header_token = codec.mint_access("header-user", "fam-h").unwrap();
    let cookie_token = codec.mint_access("cookie-user", "fam-c").unwrap();

    let ctx = RequestContext::http()
        .with_header("authorization", &format!("Bearer {header_token}"))
        .with_header("cookie", &format!("access_token={cookie_token}"));
    match resolver.resolve(&ctx).await {
        Resolution::Authenticated { principal, refresh } => {
            assert_eq!(principal.user_id, "header-user");
            assert_eq!(principal.source, CredentialSource::Header);
            assert_eq!(refresh, RefreshDecision::None);
        }
        other => panic!("expected authentication, got {other:?}"),
    }
}

#[tokio::test]
async fn no_credential_is_anonymous_with_stable_bucket() {
    let resolver = resolver();
    let ctx = RequestContext::http().with_client_addr("203.0.113.9:4411");
    let first = resolver.resolve(&ctx).await;
    let second = resolver.resolve(&ctx).await;
    match (&first, &second) {
        (Resolution::Anonymous { principal: a }, Resolution::Anonymous { principal: b }) => {
            assert!(a.user_id.starts_with("anon-"));
            assert_eq!(a.user_id, b.user_id, "same address must bucket identically within a run");
            assert!(!a.authenticated);
        }
        other => panic!("expected anonymous twice, got {other:?}"),
    }

    let elsewhere = RequestContext::http().with_client_addr("203.0.113.10:4411");
    if let Resolution::Anonymous { principal } = resolver.resolve(&elsewhere).await {
        assert_ne!(principal.user_id, first.principal().unwrap().user_id);
    } else {
        panic!("expected anonymous");
    }
}

#[tokio::test]
async fn http_fails_closed_where_websocket_falls_open() {
    let resolver = resolver();

    let http = RequestContext::http().with_header("authorization", "Bearer not-a-real-token");
    assert_rejected(&resolver.resolve(&http).await, AuthError::Malformed);

    let ws = RequestContext::websocket()
        .with_header("authorization", "Bearer not-a-real-token")
        .with_client_addr("198.51.100.7:9000");
    match resolver.resolve(&ws).await {
        Resolution::Anonymous { principal } => assert!(principal.user_id.starts_with("anon-")),
        other => panic!("websocket decode failure must downgrade to anonymous, got {other:?}"),
    }
}

#[tokio::test]
async fn websocket_query_token_authenticates() {
    let codec = codec();
    let resolver = IdentityResolver::new(Some(codec.clone()), SessionStore::in_memory());
    let token = codec.mint_access("ws-user", "fam-ws").unwrap();

    let ctx = RequestContext::websocket().with_query_string(&format!("?token={token}"));
    match resolver.resolve(&ctx).await {
        Resolution::Authenticated { principal, .. } => {
            assert_eq!(principal.user_id, "ws-user");
            assert_eq!(principal.source, CredentialSource::WebsocketQuery);
        }
        other => panic!("expected authentication, got {other:?}"),
    }
}

#[tokio::test]
async fn expired_token_on_websocket_without_refresh_is_anonymous() {
    let codec = codec();
    let resolver = IdentityResolver::new(Some(codec.clone()), SessionStore::in_memory());
    let stale = expired_access(&codec, "ws-user", "fam-ws");

    let ctx = RequestContext::websocket()
        .with_query_string(&format!("?access_token={stale}"))
        .with_client_addr("198.51.100.7:9000");
    match resolver.resolve(&ctx).await {
        Resolution::Anonymous { .. } => {}
        other => panic!("expected anonymous downgrade, got {other:?}"),
    }

    // the same stale token on HTTP is a 401-grade rejection
    let http = RequestContext::http().with_header("authorization", &format!("Bearer {stale}"));
    assert_rejected(&resolver.resolve(&http).await, AuthError::Expired);
}

#[tokio::test]
async fn refresh_token_is_not_a_primary_credential() {
    let codec = codec();
    let store = SessionStore::in_memory();
    let sid = store
        .create_session("alice", "fam-1", Clock::system().now() + 600)
        .await
        .unwrap();
    let refresh = codec.mint_refresh("alice", "fam-1", &sid).unwrap();
    let resolver = IdentityResolver::new(Some(codec), store);

    let ctx = RequestContext::http().with_header("authorization", &format!("Bearer {refresh}"));
    assert_rejected(&resolver.resolve(&ctx).await, AuthError::Malformed);
}

#[tokio::test]
async fn silent_refresh_mints_a_fresh_access_token() {
    let codec = codec();
    let store = SessionStore::in_memory();
    let expires = Clock::system().now() + 2_592_000;
    let sid = store.create_session("alice", "fam-1", expires).await.unwrap();
    let refresh = codec.mint_refresh("alice", "fam-1", &sid).unwrap();
    let stale = expired_access(&codec, "alice", "fam-1");
    let resolver = IdentityResolver::new(Some(codec.clone()), store);

    // 20 minutes after login the access token is stale; the client presents
    // only the surviving cookies
    let ctx = RequestContext::http().with_header(
        "cookie",
        &format!("__session={stale}; refresh_token={refresh}"),
    );
    match resolver.resolve(&ctx).await {
        Resolution::Authenticated { principal, refresh: decision } => {
            assert_eq!(principal.user_id, "alice");
            assert_eq!(principal.source, CredentialSource::Cookie);
            let RefreshDecision::Rotated { access_token, refresh_token } = decision else {
                panic!("expected a rotated triad");
            };
            let claims = codec.decode_access(&access_token).unwrap();
            assert_eq!(claims.sub, "alice");
            assert_eq!(claims.fam, "fam-1");
            assert!(claims.exp > Utc::now().timestamp());
            assert_eq!(refresh_token, refresh, "refresh token is re-emitted unchanged");
        }
        other => panic!("expected silent refresh, got {other:?}"),
    }

    let counters = resolver.counters();
    assert_eq!(counters.silent_refreshes, 1);
    assert_eq!(counters.authenticated, 1);
}

#[tokio::test]
async fn expired_access_without_refresh_cookie_rejects_on_http() {
    let codec = codec();
    let stale = expired_access(&codec, "alice", "fam-1");
    let resolver = IdentityResolver::new(Some(codec), SessionStore::in_memory());

    let ctx = RequestContext::http().with_header("cookie", &format!("access_token={stale}"));
    assert_rejected(&resolver.resolve(&ctx).await, AuthError::Expired);
}

#[tokio::test]
async fn family_mismatch_rejects_on_every_transport() {
    let codec = codec();
    let store = SessionStore::in_memory();
    let sid = store
        .create_session("alice", "fam-current", Clock::system().now() + 600)
        .await
        .unwrap();
    // refresh token minted for a different family than the live record
    let foreign_refresh = codec.mint_refresh("alice", "fam-old", &sid).unwrap();
    let stale = expired_access(&codec, "alice", "fam-old");
    let resolver = IdentityResolver::new(Some(codec), store);

    let cookie_header = format!("access_token={stale}; refresh_token={foreign_refresh}");

    let http = RequestContext::http().with_header("cookie", &cookie_header);
    assert_rejected(&resolver.resolve(&http).await, AuthError::FamilyMismatch);

    // the fail-open websocket exception does not apply to replay detection
    let ws = RequestContext::websocket().with_header("cookie", &cookie_header);
    assert_rejected(&resolver.resolve(&ws).await, AuthError::FamilyMismatch);

    assert_eq!(resolver.counters().family_mismatches, 2);
}

#[tokio::test]
async fn replayed_refresh_after_logout_is_rejected() {
    let codec = codec();
    let store = SessionStore::in_memory();
    let sid = store
        .create_session("alice", "fam-1", Clock::system().now() + 600)
        .await
        .unwrap();
    let refresh = codec.mint_refresh("alice", "fam-1", &sid).unwrap();
    let stale = expired_access(&codec, "alice", "fam-1");
    let resolver = IdentityResolver::new(Some(codec), store.clone());

    // logout destroys the record; every token in the family dies with it
    assert!(store.delete_session(&sid).await.unwrap());

    let ctx = RequestContext::http()
        .with_header("cookie", &format!("access_token={stale}; refresh_token={refresh}"));
    assert_rejected(&resolver.resolve(&ctx).await, AuthError::FamilyMismatch);
}

#[tokio::test]
async fn session_id_in_override_header_authenticates_via_store() {
    let codec = codec();
    let store = SessionStore::in_memory();
    let sid = store
        .create_session("alice", "fam-1", Clock::system().now() + 600)
        .await
        .unwrap();
    let resolver = IdentityResolver::new(Some(codec), store);

    let ctx = RequestContext::http().with_header("x-session-id", &sid);
    match resolver.resolve(&ctx).await {
        Resolution::Authenticated { principal, .. } => {
            assert_eq!(principal.user_id, "alice");
            assert_eq!(principal.source, CredentialSource::Header);
        }
        other => panic!("expected session-only authentication, got {other:?}"),
    }

    // unknown session id: closed on HTTP, open on WebSocket
    let unknown_http = RequestContext::http().with_header("x-session-id", "sess_unknown");
    assert_rejected(&resolver.resolve(&unknown_http).await, AuthError::Malformed);
    let unknown_ws = RequestContext::websocket().with_header("x-session-id", "sess_unknown");
    assert!(matches!(resolver.resolve(&unknown_ws).await, Resolution::Anonymous { .. }));
}

#[tokio::test]
async fn expired_session_record_no_longer_authenticates() {
    let clock_base = Arc::new(AtomicI64::new(10_000));
    let clock_handle = clock_base.clone();
    let store =
        SessionStore::in_memory_with_clock(Clock::from_fn(move || clock_handle.load(Ordering::SeqCst)));
    let sid = store.create_session("alice", "fam-1", 10_050).await.unwrap();
    let resolver = IdentityResolver::new(Some(codec()), store);

    let ctx = RequestContext::http().with_header("cookie", &format!("__session={sid}"));
    assert!(resolver.resolve(&ctx).await.is_authenticated());

    clock_base.store(10_100, Ordering::SeqCst);
    assert_rejected(&resolver.resolve(&ctx).await, AuthError::Malformed);
    // and again, to confirm the purged record behaves like a never-created one
    assert_rejected(&resolver.resolve(&ctx).await, AuthError::Malformed);
}

#[tokio::test]
async fn relaxed_mode_resolves_everything_anonymous() {
    let resolver = IdentityResolver::new(None, SessionStore::in_memory());
    let ctx = RequestContext::http()
        .with_header("authorization", "Bearer anything-at-all")
        .with_client_addr("192.0.2.4:1000");
    assert!(matches!(resolver.resolve(&ctx).await, Resolution::Anonymous { .. }));
}

#[tokio::test]
async fn login_refresh_replay_scenario() {
    let codec = codec();
    let store = SessionStore::in_memory();
    let settings =
        CookieSettings { secure: false, access_max_age_secs: 900, refresh_max_age_secs: 2_592_000 };
    let resolver = IdentityResolver::new(Some(codec.clone()), store.clone());

    // login: record + triad
    let family = "fam-scenario";
    let sid = store
        .create_session("alice", family, Clock::system().now() + 2_592_000)
        .await
        .unwrap();
    let refresh = codec.mint_refresh("alice", family, &sid).unwrap();
    let access = codec.mint_access("alice", family).unwrap();
    let triad = issue_cookies(&access, &refresh, &settings);
    assert_eq!(triad.len(), 3);
    assert_eq!(triad[0].max_age_secs, 900);
    assert_eq!(triad[1].max_age_secs, 2_592_000);

    // later, the access token has aged out; only refresh + mirror survive
    let stale = expired_access(&codec, "alice", family);
    let ctx = RequestContext::http()
        .with_header("cookie", &format!("__session={stale}; refresh_token={refresh}"));
    let resolution = resolver.resolve(&ctx).await;
    let Resolution::Authenticated { refresh: decision, .. } = &resolution else {
        panic!("expected silent refresh, got {resolution:?}");
    };
    let rewritten = rotation_cookies(decision, &settings);
    assert_eq!(rewritten.len(), 3, "a refresh rewrites the full triad");
    assert_eq!(rewritten[1].value, refresh);

    // logout, then replay the old refresh token
    assert!(store.delete_session(&sid).await.unwrap());
    assert_rejected(&resolver.resolve(&ctx).await, AuthError::FamilyMismatch);
}
