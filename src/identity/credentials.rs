//! Raw credential extraction with a strict precedence order. Produces the
//! highest-precedence bearer string without validating it; extraction never
//! raises, a malformed source simply falls through to the next one.

use super::principal::CredentialSource;
use super::request_context::{RequestContext, Transport};

/// Explicit same-request override header; highest precedence. Used by
/// in-flight re-authentication messages and legacy session-id callers.
pub const OVERRIDE_HEADER: &str = "x-session-id";
pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";
/// Mirror cookie whose value duplicates the current access token; kept for
/// alternate readers that expect this name.
pub const MIRROR_COOKIE: &str = "__session";
/// WebSocket handshake query parameters, tried in order.
pub const WS_QUERY_PARAMS: [&str; 2] = ["access_token", "token"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawSource {
    OverrideHeader,
    BearerHeader,
    AccessCookie,
    WsQuery,
    MirrorCookie,
}

impl RawSource {
    pub fn principal_source(self) -> CredentialSource {
        match self {
            RawSource::OverrideHeader | RawSource::BearerHeader => CredentialSource::Header,
            RawSource::AccessCookie | RawSource::MirrorCookie => CredentialSource::Cookie,
            RawSource::WsQuery => CredentialSource::WebsocketQuery,
        }
    }

    /// Whether a value from this source that is not a decodable token may be
    /// an opaque session id (the legacy session-mirror signal).
    pub fn may_be_session_id(self) -> bool {
        matches!(self, RawSource::OverrideHeader | RawSource::MirrorCookie)
    }
}

#[derive(Debug, Clone)]
pub struct RawCredential {
    pub value: String,
    pub source: RawSource,
}

fn bearer_value(header: &str) -> Option<&str> {
    let s = header.trim();
    if s.len() > 7 && s[..7].eq_ignore_ascii_case("bearer ") {
        let token = s[7..].trim();
        if !token.is_empty() {
            return Some(token);
        }
    }
    None
}

fn non_empty(value: &str, source: RawSource) -> Option<RawCredential> {
    let v = value.trim();
    if v.is_empty() {
        None
    } else {
        Some(RawCredential { value: v.to_string(), source })
    }
}

/// Highest-precedence raw credential, or `None` when the request carries no
/// identity signal at all (which is not an error).
pub fn resolve_credential(ctx: &RequestContext) -> Option<RawCredential> {
    if let Some(v) = ctx.header(OVERRIDE_HEADER) {
        if let Some(c) = non_empty(v, RawSource::OverrideHeader) {
            return Some(c);
        }
    }
    if let Some(auth) = ctx.header("authorization") {
        if let Some(token) = bearer_value(auth) {
            return non_empty(token, RawSource::BearerHeader);
        }
    }
    if let Some(v) = ctx.cookie(ACCESS_COOKIE) {
        if let Some(c) = non_empty(v, RawSource::AccessCookie) {
            return Some(c);
        }
    }
    if ctx.transport() == Transport::WebSocket {
        for param in WS_QUERY_PARAMS {
            if let Some(v) = ctx.query_param(param) {
                if let Some(c) = non_empty(v, RawSource::WsQuery) {
                    return Some(c);
                }
            }
        }
    }
    // final fallback on both transports: the mirror cookie
    if let Some(v) = ctx.cookie(MIRROR_COOKIE) {
        if let Some(c) = non_empty(v, RawSource::MirrorCookie) {
            return Some(c);
        }
    }
    None
}
