//! Resolution state machine: raw credential → decode → terminal state.
//!
//! Terminal states are `Authenticated`, `Anonymous`, `Rejected`, and
//! `StoreUnavailable`. HTTP fails closed on a bad credential; a WebSocket
//! handshake downgrades the same failure to anonymous so the upgrade can
//! complete. That is the one deliberate asymmetry. A refresh-token family
//! mismatch is treated as replay and rejects on every transport.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::AuthError;
use crate::store::SessionStore;
use crate::token::{TokenCodec, TokenKind};

use super::anon::derive_pseudo_id;
use super::credentials::{resolve_credential, RawCredential, REFRESH_COOKIE};
use super::principal::Principal;
use super::request_context::{RequestContext, Transport};

/// Whether a silent refresh happened during resolution, and with which
/// tokens. The boundary turns `Rotated` into the cookie-triad rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshDecision {
    None,
    Rotated { access_token: String, refresh_token: String },
}

impl RefreshDecision {
    pub fn rotated(&self) -> bool { matches!(self, RefreshDecision::Rotated { .. }) }
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Authenticated { principal: Principal, refresh: RefreshDecision },
    Anonymous { principal: Principal },
    Rejected(AuthError),
    StoreUnavailable,
}

impl Resolution {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Resolution::Authenticated { principal, .. } | Resolution::Anonymous { principal } => {
                Some(principal)
            }
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Resolution::Authenticated { .. })
    }
}

#[derive(Default)]
struct Counters {
    authenticated: AtomicU64,
    anonymous: AtomicU64,
    rejected: AtomicU64,
    store_unavailable: AtomicU64,
    silent_refreshes: AtomicU64,
    family_mismatches: AtomicU64,
}

/// Point-in-time counter readout for telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub authenticated: u64,
    pub anonymous: u64,
    pub rejected: u64,
    pub store_unavailable: u64,
    pub silent_refreshes: u64,
    pub family_mismatches: u64,
}

pub struct IdentityResolver {
    codec: Option<TokenCodec>,
    store: SessionStore,
    counters: Counters,
}

impl IdentityResolver {
    pub fn new(codec: Option<TokenCodec>, store: SessionStore) -> Self {
        IdentityResolver { codec, store, counters: Counters::default() }
    }

    pub fn store(&self) -> &SessionStore { &self.store }

    pub fn counters(&self) -> CounterSnapshot {
        let c = &self.counters;
        CounterSnapshot {
            authenticated: c.authenticated.load(Ordering::Relaxed),
            anonymous: c.anonymous.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            store_unavailable: c.store_unavailable.load(Ordering::Relaxed),
            silent_refreshes: c.silent_refreshes.load(Ordering::Relaxed),
            family_mismatches: c.family_mismatches.load(Ordering::Relaxed),
        }
    }

    /// Resolve the caller behind `ctx`. Never panics and never returns a
    /// backend-specific error; every outcome is one of the terminal states.
    pub async fn resolve(&self, ctx: &RequestContext) -> Resolution {
        let resolution = self.resolve_inner(ctx).await;
        match &resolution {
            Resolution::Authenticated { principal, refresh } => {
                self.counters.authenticated.fetch_add(1, Ordering::Relaxed);
                if refresh.rotated() {
                    self.counters.silent_refreshes.fetch_add(1, Ordering::Relaxed);
                }
                debug!(target: "identity", "resolved user={} refreshed={}", principal.user_id, refresh.rotated());
            }
            Resolution::Anonymous { principal } => {
                self.counters.anonymous.fetch_add(1, Ordering::Relaxed);
                debug!(target: "identity", "resolved anonymous bucket={}", principal.user_id);
            }
            Resolution::Rejected(err) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                info!(target: "identity", "rejected credential: {}", err.code_str());
            }
            Resolution::StoreUnavailable => {
                self.counters.store_unavailable.fetch_add(1, Ordering::Relaxed);
                warn!(target: "identity", "session store unreachable during resolution");
            }
        }
        resolution
    }

    async fn resolve_inner(&self, ctx: &RequestContext) -> Resolution {
        // Relaxed deployments run without a codec: everything is anonymous.
        let Some(codec) = &self.codec else { return self.anonymous(ctx) };

        let Some(raw) = resolve_credential(ctx) else { return self.anonymous(ctx) };

        match codec.decode(&raw.value) {
            Ok(claims) if claims.kind == TokenKind::Access => Resolution::Authenticated {
                principal: Principal::authenticated(claims.sub, raw.source.principal_source()),
                refresh: RefreshDecision::None,
            },
            // A refresh token is not a primary credential.
            Ok(_) => self.reject_or_downgrade(ctx, AuthError::Malformed),
            Err(AuthError::Expired) => self.silent_refresh(ctx, &raw, codec).await,
            Err(AuthError::Malformed) if raw.source.may_be_session_id() => {
                self.session_id_lookup(ctx, &raw).await
            }
            Err(err) => self.reject_or_downgrade(ctx, err),
        }
    }

    /// Expired access credential: attempt the refresh path. Requires a valid
    /// refresh token whose family matches the live session record.
    async fn silent_refresh(
        &self,
        ctx: &RequestContext,
        raw: &RawCredential,
        codec: &TokenCodec,
    ) -> Resolution {
        let Some(refresh_value) = ctx.cookie(REFRESH_COOKIE) else {
            return self.reject_or_downgrade(ctx, AuthError::Expired);
        };
        let claims = match codec.decode_refresh(refresh_value) {
            Ok(c) => c,
            Err(err) => return self.reject_or_downgrade(ctx, err),
        };
        let Some(session_id) = claims.sid.as_deref() else {
            return self.reject_or_downgrade(ctx, AuthError::Malformed);
        };

        let record = match self.store.get_record(session_id).await {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "identity", "store unreachable during refresh family check: {}", e);
                return self.store_down(ctx);
            }
        };
        let Some(record) = record else {
            // refresh token outlived its session record: replay of a revoked family
            self.counters.family_mismatches.fetch_add(1, Ordering::Relaxed);
            warn!(target: "identity", "refresh token presented for revoked or unknown session sid={}", session_id);
            return Resolution::Rejected(AuthError::FamilyMismatch);
        };
        if record.family_id != claims.fam || record.subject != claims.sub {
            self.counters.family_mismatches.fetch_add(1, Ordering::Relaxed);
            warn!(
                target: "identity",
                "refresh token family mismatch sid={} token_family={} record_family={}; suspected replay",
                session_id, claims.fam, record.family_id
            );
            return Resolution::Rejected(AuthError::FamilyMismatch);
        }

        let access_token = match codec.mint_access(&record.subject, &record.family_id) {
            Ok(t) => t,
            Err(e) => {
                error!(target: "identity", "failed to mint access token during refresh: {}", e);
                return self.reject_or_downgrade(ctx, AuthError::Malformed);
            }
        };
        info!(target: "identity", "silent refresh user={} family={}", record.subject, record.family_id);
        Resolution::Authenticated {
            principal: Principal::authenticated(record.subject, raw.source.principal_source()),
            refresh: RefreshDecision::Rotated {
                access_token,
                // re-emitted unchanged; revocation is family-level
                refresh_token: refresh_value.to_string(),
            },
        }
    }

    /// The credential is not a token but may be an opaque session id from a
    /// legacy reader. Session-only authentication depends on the store.
    async fn session_id_lookup(&self, ctx: &RequestContext, raw: &RawCredential) -> Resolution {
        match self.store.get_record(&raw.value).await {
            Ok(Some(record)) => Resolution::Authenticated {
                principal: Principal::authenticated(record.subject, raw.source.principal_source()),
                refresh: RefreshDecision::None,
            },
            Ok(None) => self.reject_or_downgrade(ctx, AuthError::Malformed),
            Err(e) => {
                warn!(target: "identity", "store unreachable during session-id lookup: {}", e);
                self.store_down(ctx)
            }
        }
    }

    /// HTTP fails closed; a WebSocket handshake falls open to anonymous so
    /// the upgrade completes and client reconnect semantics survive.
    fn reject_or_downgrade(&self, ctx: &RequestContext, err: AuthError) -> Resolution {
        match ctx.transport() {
            Transport::Http => Resolution::Rejected(err),
            Transport::WebSocket => {
                debug!(target: "identity", "downgrading websocket credential failure to anonymous: {}", err.code_str());
                self.anonymous(ctx)
            }
        }
    }

    /// Store outage policy: retry-later on HTTP, anonymous on WebSocket.
    fn store_down(&self, ctx: &RequestContext) -> Resolution {
        match ctx.transport() {
            Transport::Http => Resolution::StoreUnavailable,
            Transport::WebSocket => self.anonymous(ctx),
        }
    }

    fn anonymous(&self, ctx: &RequestContext) -> Resolution {
        Resolution::Anonymous { principal: Principal::anonymous(derive_pseudo_id(ctx.client_addr())) }
    }
}
