//!
//! doorman HTTP/WS boundary
//! ------------------------
//! Axum front door for the identity core. Every route funnels through the
//! same resolution path; the only handler-specific work is translating the
//! terminal state to a status code and attaching cookie instructions.
//!
//! Responsibilities:
//! - Login/logout endpoints driven by the external credential issuer.
//! - Identity probe endpoint with silent cookie rotation on refresh.
//! - WebSocket endpoint that admits anonymous callers but still rejects
//!   replayed refresh credentials before the upgrade.
//! - Background expiry sweeper for the in-process session backend.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::extract::{ConnectInfo, RawQuery, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::cookies::{clear_cookies, issue_cookies, rotation_cookies, CookieSettings, SetCookie};
use crate::identity::{
    CredentialIssuer, ExchangeRequest, IdentityResolver, RequestContext, Resolution,
    StaticCredentialIssuer, Transport, OVERRIDE_HEADER, REFRESH_COOKIE,
};
use crate::store::{Clock, SessionStore};
use crate::token::TokenCodec;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<IdentityResolver>,
    pub issuer: Arc<dyn CredentialIssuer>,
    /// Needed for minting at login/logout; `None` in relaxed deployments.
    pub codec: Option<TokenCodec>,
    pub cookie_settings: CookieSettings,
    pub refresh_ttl_secs: i64,
}

pub async fn run_with_port(http_port: u16) -> anyhow::Result<()> {
    let cfg = AuthConfig::from_env();
    cfg.validate()?;
    let codec = TokenCodec::from_config(&cfg)?;
    let store = SessionStore::connect(cfg.store_url.as_deref(), Clock::system()).await;
    info!(
        target: "startup",
        "session backend: {}",
        if store.is_remote() { "distributed" } else { "in-process" }
    );

    // Background session sweeper; the distributed backend expires natively so
    // the pass is free there.
    {
        let store_for_sweep = store.clone();
        tokio::spawn(async move {
            loop {
                let removed = store_for_sweep.cleanup_expired().await;
                if removed > 0 {
                    debug!(removed = removed, "session_sweep");
                }
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        });
    }

    let state = AppState {
        resolver: Arc::new(IdentityResolver::new(codec.clone(), store)),
        issuer: Arc::new(StaticCredentialIssuer::from_env()),
        codec,
        cookie_settings: CookieSettings::from_config(&cfg),
        refresh_ttl_secs: cfg.refresh_ttl_secs,
    };

    let app = Router::new()
        .route("/", get(|| async { "doorman ok" }))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/whoami", get(whoami))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!("Starting doorman on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

/// Convenience entry point using the default port.
pub async fn run() -> anyhow::Result<()> {
    let port = std::env::var("DOORMAN_HTTP_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);
    run_with_port(port).await
}

fn request_context(
    transport: Transport,
    headers: &HeaderMap,
    raw_query: Option<&str>,
    addr: Option<SocketAddr>,
) -> RequestContext {
    let mut ctx = match transport {
        Transport::Http => RequestContext::http(),
        Transport::WebSocket => RequestContext::websocket(),
    };
    for (name, value) in headers {
        if let Ok(v) = value.to_str() {
            ctx = ctx.with_header(name.as_str(), v);
        }
    }
    if let Some(q) = raw_query {
        ctx = ctx.with_query_string(q);
    }
    if let Some(a) = addr {
        ctx = ctx.with_client_addr(a.to_string());
    }
    ctx
}

/// Attach the full instruction set or nothing at all; a partially attached
/// triad must never leave the process.
fn apply_cookies(headers: &mut HeaderMap, cookies: &[SetCookie]) -> bool {
    let mut rendered = Vec::with_capacity(cookies.len());
    for c in cookies {
        match HeaderValue::from_str(&c.header_value()) {
            Ok(v) => rendered.push(v),
            Err(_) => return false,
        }
    }
    for v in rendered {
        headers.append(header::SET_COOKIE, v);
    }
    true
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    provider: String,
    code: String,
    #[serde(default)]
    redirect_uri: Option<String>,
}

async fn login(State(state): State<AppState>, Json(payload): Json<LoginPayload>) -> impl IntoResponse {
    let Some(codec) = state.codec.as_ref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            HeaderMap::new(),
            Json(json!({"status":"error","error":"authentication disabled in relaxed mode"})),
        );
    };
    let req = ExchangeRequest {
        provider: payload.provider,
        code: payload.code,
        redirect_uri: payload.redirect_uri,
    };
    let cred = match state.issuer.exchange(&req).await {
        Ok(c) => c,
        Err(e) => {
            info!(target: "auth", "credential exchange refused: {}", e);
            return (
                StatusCode::UNAUTHORIZED,
                HeaderMap::new(),
                Json(json!({"status":"unauthorized"})),
            );
        }
    };

    let family_id = Uuid::new_v4().to_string();
    let store = state.resolver.store();
    let expires_at = store.clock().now() + state.refresh_ttl_secs;
    // The refresh family is anchored to a live record; without one the tokens
    // would be unrefreshable and replay-undetectable, so fail the login.
    let session_id = match store.create_session(&cred.subject, &family_id, expires_at).await {
        Ok(sid) => sid,
        Err(e) => {
            warn!(target: "auth", "session store write failed during login: {}", e);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                HeaderMap::new(),
                Json(json!({"status":"error","code":"store_unavailable"})),
            );
        }
    };

    let minted = codec
        .mint_access(&cred.subject, &family_id)
        .and_then(|access| codec.mint_refresh(&cred.subject, &family_id, &session_id).map(|refresh| (access, refresh)));
    let (access, refresh) = match minted {
        Ok(pair) => pair,
        Err(e) => {
            warn!(target: "auth", "token mint failed during login: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                HeaderMap::new(),
                Json(json!({"status":"error","error":"token issuance failed"})),
            );
        }
    };

    let mut headers = HeaderMap::new();
    if !apply_cookies(&mut headers, &issue_cookies(&access, &refresh, &state.cookie_settings)) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            HeaderMap::new(),
            Json(json!({"status":"error","error":"cookie issuance failed"})),
        );
    }
    info!(target: "auth", "login user={} family={}", cred.subject, family_id);
    (StatusCode::OK, headers, Json(json!({"status":"ok","user_id": cred.subject})))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let ctx = request_context(Transport::Http, &headers, None, None);

    // Locate the session record via the refresh token's sid claim, falling
    // back to an explicit session id in the override header.
    let session_id = state
        .codec
        .as_ref()
        .and_then(|codec| ctx.cookie(REFRESH_COOKIE).and_then(|v| codec.decode_refresh(v).ok()))
        .and_then(|claims| claims.sid)
        .or_else(|| ctx.header(OVERRIDE_HEADER).map(|s| s.to_string()));

    if let Some(sid) = session_id {
        match state.resolver.store().delete_session(&sid).await {
            Ok(existed) => debug!(target: "auth", "logout sid={} existed={}", sid, existed),
            Err(e) => warn!(target: "auth", "session delete failed during logout: {}", e),
        }
    }

    let mut out = HeaderMap::new();
    apply_cookies(&mut out, &clear_cookies(&state.cookie_settings));
    (StatusCode::OK, out, Json(json!({"status":"ok"})))
}

async fn whoami(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let ctx = request_context(Transport::Http, &headers, None, Some(addr));
    match state.resolver.resolve(&ctx).await {
        Resolution::Authenticated { principal, refresh } => {
            let mut out = HeaderMap::new();
            if !apply_cookies(&mut out, &rotation_cookies(&refresh, &state.cookie_settings)) {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    HeaderMap::new(),
                    Json(json!({"status":"error","error":"cookie issuance failed"})),
                );
            }
            (
                StatusCode::OK,
                out,
                Json(json!({
                    "status":"ok",
                    "user_id": principal.user_id,
                    "authenticated": true,
                    "source": principal.source
                })),
            )
        }
        Resolution::Anonymous { principal } => (
            StatusCode::OK,
            HeaderMap::new(),
            Json(json!({
                "status":"ok",
                "user_id": principal.user_id,
                "authenticated": false,
                "source": principal.source
            })),
        ),
        Resolution::Rejected(err) => (
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::UNAUTHORIZED),
            HeaderMap::new(),
            Json(json!({"status":"unauthorized","code": err.code_str(),"error": err.message()})),
        ),
        Resolution::StoreUnavailable => (
            StatusCode::SERVICE_UNAVAILABLE,
            HeaderMap::new(),
            Json(json!({"status":"error","code":"store_unavailable"})),
        ),
    }
}

async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
    ws: WebSocketUpgrade,
) -> Response {
    let ctx = request_context(Transport::WebSocket, &headers, raw_query.as_deref(), Some(addr));
    let principal = match state.resolver.resolve(&ctx).await {
        Resolution::Authenticated { principal, .. } => principal,
        Resolution::Anonymous { principal } => principal,
        Resolution::Rejected(err) => {
            // only the replay-detection path rejects a handshake
            return (
                StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::UNAUTHORIZED),
                Json(json!({"status":"unauthorized","code": err.code_str()})),
            )
                .into_response();
        }
        Resolution::StoreUnavailable => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status":"error","code":"store_unavailable"})),
            )
                .into_response();
        }
    };

    let reply = json!({
        "status":"ok",
        "user_id": principal.user_id,
        "authenticated": principal.authenticated,
        "source": principal.source
    })
    .to_string();
    ws.on_upgrade(move |mut socket| async move {
        use futures_util::StreamExt;
        while let Some(Ok(msg)) = socket.next().await {
            match msg {
                Message::Text(_) => {
                    if socket.send(Message::Text(reply.clone().into())).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    })
}
