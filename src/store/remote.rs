//! Distributed session backend over Redis. Records live under
//! `session:<session_id>` as a JSON value with a native TTL set at write time,
//! so expiry needs no sweeper here. Stored values are untrusted on read:
//! anything unparsable is treated as absent, never an error.

use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{SessionRecord, StoreError, StoreResult};

const KEY_PREFIX: &str = "session:";

/// Value document; the session id is the key, not part of the payload.
#[derive(Debug, Serialize, Deserialize)]
struct WireRecord {
    subject: String,
    family_id: String,
    expires_at: i64,
}

pub struct RemoteBackend {
    conn: ConnectionManager,
}

fn transport<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Transport(e.to_string())
}

fn key_for(session_id: &str) -> String {
    format!("{}{}", KEY_PREFIX, session_id)
}

impl RemoteBackend {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(transport)?;
        let conn = ConnectionManager::new(client).await.map_err(transport)?;
        Ok(RemoteBackend { conn })
    }

    pub async fn insert(&self, record: &SessionRecord, now: i64) -> StoreResult<()> {
        let ttl = record.expires_at - now;
        if ttl <= 0 {
            // already logically absent; nothing worth persisting
            return Ok(());
        }
        let payload = serde_json::to_string(&WireRecord {
            subject: record.subject.clone(),
            family_id: record.family_id.clone(),
            expires_at: record.expires_at,
        })
        .map_err(transport)?;
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key_for(&record.session_id))
            .arg(payload)
            .arg("EX")
            .arg(ttl)
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        Ok(())
    }

    pub async fn get(&self, session_id: &str) -> StoreResult<Option<SessionRecord>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(key_for(session_id))
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        let Some(raw) = raw else { return Ok(None) };
        match serde_json::from_str::<WireRecord>(&raw) {
            Ok(wire) => Ok(Some(SessionRecord {
                session_id: session_id.to_string(),
                subject: wire.subject,
                family_id: wire.family_id,
                expires_at: wire.expires_at,
            })),
            Err(e) => {
                debug!(target: "session_store", "discarding unparsable session value for {}: {}", session_id, e);
                Ok(None)
            }
        }
    }

    pub async fn delete(&self, session_id: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL")
            .arg(key_for(session_id))
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        Ok(removed > 0)
    }
}
