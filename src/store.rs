//! Session record store: maps an opaque session id to the subject and token
//! family it was issued for. The two interchangeable backends (a distributed
//! TTL-native cache and an in-process map with lazy expiry) behave
//! identically from the caller's perspective.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::tprintln;

pub mod memory;
pub mod remote;

use memory::MemoryBackend;
use remote::RemoteBackend;

/// Injectable time source so expiry is testable without sleeping.
#[derive(Clone)]
pub struct Clock(Arc<dyn Fn() -> i64 + Send + Sync>);

impl Clock {
    pub fn system() -> Self { Clock(Arc::new(|| Utc::now().timestamp())) }

    pub fn from_fn<F: Fn() -> i64 + Send + Sync + 'static>(f: F) -> Self { Clock(Arc::new(f)) }

    pub fn now(&self) -> i64 { (self.0)() }
}

impl Default for Clock {
    fn default() -> Self { Clock::system() }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock").finish_non_exhaustive()
    }
}

/// Immutable once created; all mutation is delete + create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    /// User id the session was issued for.
    pub subject: String,
    /// Shared with every refresh token issued alongside this session.
    pub family_id: String,
    /// Unix seconds. A record past this instant is logically absent whether or
    /// not it has been physically purged.
    pub expires_at: i64,
}

/// Store-internal transport failure. Never crosses the store boundary as a
/// panic or a backend-specific type; the resolver maps it to policy.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session store transport failure: {0}")]
    Transport(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

enum Backend {
    Memory(MemoryBackend),
    Remote(RemoteBackend),
}

#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<Backend>,
    clock: Clock,
}

// 192-bit random suffix, base64url without padding
fn gen_session_id() -> String {
    let mut buf = [0u8; 24];
    let _ = getrandom::getrandom(&mut buf);
    format!("sess_{}", base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

impl SessionStore {
    pub fn in_memory() -> Self { Self::in_memory_with_clock(Clock::system()) }

    pub fn in_memory_with_clock(clock: Clock) -> Self {
        SessionStore { backend: Arc::new(Backend::Memory(MemoryBackend::new())), clock }
    }

    /// Connect the configured backend. A distributed URL that cannot be
    /// reached at construction time falls back to the in-process backend with
    /// a warning instead of failing startup.
    pub async fn connect(url: Option<&str>, clock: Clock) -> Self {
        let Some(url) = url else { return Self::in_memory_with_clock(clock) };
        match RemoteBackend::connect(url).await {
            Ok(remote) => SessionStore { backend: Arc::new(Backend::Remote(remote)), clock },
            Err(e) => {
                warn!(target: "session_store", "distributed backend unreachable ({}), falling back to in-process store", e);
                Self::in_memory_with_clock(clock)
            }
        }
    }

    pub fn is_remote(&self) -> bool { matches!(*self.backend, Backend::Remote(_)) }

    pub fn clock(&self) -> &Clock { &self.clock }

    /// Persist a fresh record and return its unpredictable id.
    pub async fn create_session(
        &self,
        subject: &str,
        family_id: &str,
        expires_at: i64,
    ) -> StoreResult<String> {
        let session_id = gen_session_id();
        let record = SessionRecord {
            session_id: session_id.clone(),
            subject: subject.to_string(),
            family_id: family_id.to_string(),
            expires_at,
        };
        match &*self.backend {
            Backend::Memory(m) => m.insert(record),
            Backend::Remote(r) => r.insert(&record, self.clock.now()).await?,
        }
        tprintln!("session.create subject={} sid={} family={}", subject, session_id, family_id);
        Ok(session_id)
    }

    /// Full live record, or `None`. An expired record found on the way is
    /// deleted as a side effect before reporting absent.
    pub async fn get_record(&self, session_id: &str) -> StoreResult<Option<SessionRecord>> {
        let now = self.clock.now();
        match &*self.backend {
            Backend::Memory(m) => Ok(m.get(session_id, now)),
            Backend::Remote(r) => {
                let found = r.get(session_id).await?;
                match found {
                    Some(rec) if rec.expires_at > now => Ok(Some(rec)),
                    Some(_) => {
                        // native TTL lags an injected clock; enforce expiry ourselves
                        let _ = r.delete(session_id).await;
                        Ok(None)
                    }
                    None => Ok(None),
                }
            }
        }
    }

    /// Family id if and only if a live record exists.
    pub async fn get_session(&self, session_id: &str) -> StoreResult<Option<String>> {
        Ok(self.get_record(session_id).await?.map(|r| r.family_id))
    }

    /// Idempotent; reports whether a record existed.
    pub async fn delete_session(&self, session_id: &str) -> StoreResult<bool> {
        let existed = match &*self.backend {
            Backend::Memory(m) => m.delete(session_id),
            Backend::Remote(r) => r.delete(session_id).await?,
        };
        tprintln!("session.delete sid={} existed={}", session_id, existed);
        Ok(existed)
    }

    /// Purge expired records. The distributed backend expires entries natively
    /// so this is a no-op there; the in-process map is scanned.
    pub async fn cleanup_expired(&self) -> usize {
        match &*self.backend {
            Backend::Memory(m) => m.sweep(self.clock.now()),
            Backend::Remote(_) => 0,
        }
    }
}
