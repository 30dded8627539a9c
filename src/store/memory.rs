//! In-process session backend: a single mutex-guarded map with manual expiry.
//! Expired entries are dropped lazily on read and in bulk by `sweep`.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::SessionRecord;

pub struct MemoryBackend {
    map: Mutex<HashMap<String, SessionRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend { map: Mutex::new(HashMap::new()) }
    }

    pub fn insert(&self, record: SessionRecord) {
        self.map.lock().insert(record.session_id.clone(), record);
    }

    /// Live record, or `None`. If the stored record is expired it is removed
    /// before returning, so a later read is indistinguishable from a
    /// never-created id.
    pub fn get(&self, session_id: &str, now: i64) -> Option<SessionRecord> {
        let mut m = self.map.lock();
        match m.get(session_id) {
            Some(rec) if rec.expires_at > now => Some(rec.clone()),
            Some(_) => {
                m.remove(session_id);
                None
            }
            None => None,
        }
    }

    pub fn delete(&self, session_id: &str) -> bool {
        self.map.lock().remove(session_id).is_some()
    }

    /// Remove all expired records. Returns number removed.
    pub fn sweep(&self, now: i64) -> usize {
        let mut m = self.map.lock();
        let expired: Vec<String> = m
            .iter()
            .filter(|(_, rec)| rec.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        let removed = expired.len();
        for k in expired {
            m.remove(&k);
        }
        removed
    }

    pub fn len(&self) -> usize { self.map.lock().len() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(sid: &str, expires_at: i64) -> SessionRecord {
        SessionRecord {
            session_id: sid.to_string(),
            subject: "user-1".to_string(),
            family_id: "fam-1".to_string(),
            expires_at,
        }
    }

    #[test]
    fn expired_records_are_dropped_on_read() {
        let b = MemoryBackend::new();
        b.insert(rec("sess_a", 100));
        assert!(b.get("sess_a", 50).is_some());
        assert!(b.get("sess_a", 100).is_none());
        assert_eq!(b.len(), 0, "expired record should have been purged by the read");
    }

    #[test]
    fn sweep_removes_only_expired() {
        let b = MemoryBackend::new();
        b.insert(rec("sess_a", 100));
        b.insert(rec("sess_b", 200));
        b.insert(rec("sess_c", 300));
        assert_eq!(b.sweep(200), 2);
        assert_eq!(b.len(), 1);
        assert!(b.get("sess_c", 200).is_some());
    }

    #[test]
    fn delete_is_idempotent() {
        let b = MemoryBackend::new();
        b.insert(rec("sess_a", 100));
        assert!(b.delete("sess_a"));
        assert!(!b.delete("sess_a"));
    }
}
