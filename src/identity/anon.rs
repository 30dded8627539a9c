//! Stable pseudo-identity for unauthenticated traffic. One-way hash of the
//! caller's network address, seeded per process so ids are not linkable
//! across runs. Telemetry and rate-limit bucketing only, never an
//! authorization grant.

use once_cell::sync::Lazy;
use xxhash_rust::xxh3::xxh3_64_with_seed;

static PROCESS_SEED: Lazy<u64> = Lazy::new(|| {
    let mut buf = [0u8; 8];
    let _ = getrandom::getrandom(&mut buf);
    u64::from_le_bytes(buf)
});

/// Deterministic within a process lifetime for a given address; 48 bits of
/// hash rendered as 12 hex chars.
pub fn derive_pseudo_id(client_addr: Option<&str>) -> String {
    let addr = client_addr.unwrap_or("unknown");
    let h = xxh3_64_with_seed(addr.as_bytes(), *PROCESS_SEED);
    format!("anon-{:012x}", h & 0xffff_ffff_ffff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_address_same_id() {
        assert_eq!(derive_pseudo_id(Some("10.0.0.1:5000")), derive_pseudo_id(Some("10.0.0.1:5000")));
    }

    #[test]
    fn different_addresses_differ() {
        assert_ne!(derive_pseudo_id(Some("10.0.0.1:5000")), derive_pseudo_id(Some("10.0.0.2:5000")));
    }

    #[test]
    fn shape_is_fixed_length() {
        let id = derive_pseudo_id(None);
        assert!(id.starts_with("anon-"));
        assert_eq!(id.len(), "anon-".len() + 12);
    }
}
