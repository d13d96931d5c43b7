//! Key layout for accounting records and their locks.
//!
//! Every key for one associated ID embeds `{associated_id}` so a clustered
//! store places them on the same slot.

use std::sync::Arc;

/// Maps `(resource, associated_id)` to the accounting record key.
pub type KeyFn = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

pub const DEFAULT_PREFIX: &str = "dcs";

pub fn build_key(prefix: &str, resource: &str, associated_id: &str) -> String {
    format!("{prefix}:resource:{{{associated_id}}}:{resource}")
}

pub fn default_key_fn(prefix: impl Into<String>) -> KeyFn {
    let prefix = prefix.into();
    Arc::new(move |resource, associated_id| build_key(&prefix, resource, associated_id))
}

/// Companion key holding the last refresh timestamp (ms since epoch).
pub fn refreshed_key(record_key: &str) -> String {
    format!("{record_key}:refreshed_at")
}

pub fn lock_key(record_key: &str) -> String {
    format!("{record_key}:lock")
}

/// Channel on which a lock holder announces release.
pub fn release_channel(lock_key: &str) -> String {
    format!("{lock_key}:released")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_share_hashtag() {
        let key_fn = default_key_fn(DEFAULT_PREFIX);
        let record = key_fn("CPU", "acctA");
        assert_eq!(record, "dcs:resource:{acctA}:CPU");
        assert_eq!(refreshed_key(&record), "dcs:resource:{acctA}:CPU:refreshed_at");
        let lock = lock_key(&record);
        assert_eq!(
            release_channel(&lock),
            "dcs:resource:{acctA}:CPU:lock:released"
        );
    }
}
