// copilot-mcp - Completion cache
//! Time-bounded memo of successful completion results, keyed by a
//! fingerprint of the request parameters. Expired entries are evicted lazily
//! when they are looked up.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
    value: Value,
    expires_at: Instant,
}

pub struct ResponseCache {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if Instant::now() < entry.expires_at => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        // Expired: drop it unless someone replaced it in between.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| Instant::now() >= e.expires_at) {
            entries.remove(key);
        }
        None
    }

    /// Store `value` for `ttl`. A lifetime past the clock's range is not
    /// cached at all.
    pub async fn insert_with_ttl(&self, key: String, value: Value, ttl: Duration) {
        let Some(expires_at) = Instant::now().checked_add(ttl) else {
            tracing::warn!(ttl_secs = ttl.as_secs(), "cache: ttl out of range, entry not stored");
            return;
        };
        self.entries.write().await.insert(key, Entry { value, expires_at });
    }
}

/// Stable fingerprint of a parameter object. Object keys serialize in sorted
/// order, so `{"a":1,"b":2}` and `{"b":2,"a":1}` map to the same entry.
pub fn fingerprint(params: &Value) -> String {
    let canonical = params.to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}
