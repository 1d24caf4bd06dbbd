use crate::error::Result;
use crate::kv::KvStore;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Embedded `KvStore` fallback (§10 `redis.use_embedded`) for single-replica dev/test
/// deployments where running Redis is overkill. Sled has no native TTL, so each entry
/// carries its own expiry and is checked lazily on read.
#[derive(Clone)]
pub struct SledKv {
    tree: sled::Tree,
}

#[derive(Serialize, Deserialize)]
struct Entry {
    value: String,
    expires_at_ms: Option<i64>,
}

impl Entry {
    fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms.map(|t| t <= now_ms).unwrap_or(false)
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl SledKv {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        let tree = db.open_tree("kv")?;
        Ok(Self { tree })
    }

    fn read_live(&self, key: &str) -> Result<Option<Entry>> {
        match self.tree.get(key)? {
            Some(bytes) => {
                let entry: Entry = bincode::deserialize(&bytes)
                    .map_err(|e| crate::error::AppError::Serialization(e.to_string()))?;
                if entry.is_expired(now_ms()) {
                    self.tree.remove(key)?;
                    Ok(None)
                } else {
                    Ok(Some(entry))
                }
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl KvStore for SledKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_live(key)?.map(|e| e.value))
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool> {
        loop {
            let current = self.tree.get(key)?;
            let occupied = match &current {
                Some(bytes) => {
                    let entry: Entry = bincode::deserialize(bytes)
                        .map_err(|e| crate::error::AppError::Serialization(e.to_string()))?;
                    !entry.is_expired(now_ms())
                }
                None => false,
            };
            if occupied {
                return Ok(false);
            }

            let new_entry = Entry {
                value: value.to_string(),
                expires_at_ms: Some(now_ms() + ttl_secs as i64 * 1000),
            };
            let new_bytes = bincode::serialize(&new_entry)
                .map_err(|e| crate::error::AppError::Serialization(e.to_string()))?;
            if self.tree.compare_and_swap(key, current, Some(new_bytes))?.is_ok() {
                return Ok(true);
            }
            // Lost the race against a concurrent writer; retry.
        }
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        loop {
            let current = self.tree.get(key)?;
            let current_value: i64 = match &current {
                Some(bytes) => {
                    let entry: Entry = bincode::deserialize(bytes)
                        .map_err(|e| crate::error::AppError::Serialization(e.to_string()))?;
                    if entry.is_expired(now_ms()) {
                        0
                    } else {
                        entry.value.parse().unwrap_or(0)
                    }
                }
                None => 0,
            };
            let next = current_value + 1;
            let new_entry = Entry {
                value: next.to_string(),
                expires_at_ms: None,
            };
            let new_bytes = bincode::serialize(&new_entry)
                .map_err(|e| crate::error::AppError::Serialization(e.to_string()))?;
            if self.tree.compare_and_swap(key, current, Some(new_bytes))?.is_ok() {
                return Ok(next);
            }
        }
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<()> {
        if let Some(mut entry) = self.read_live(key)? {
            entry.expires_at_ms = Some(now_ms() + ttl_secs as i64 * 1000);
            let bytes = bincode::serialize(&entry)
                .map_err(|e| crate::error::AppError::Serialization(e.to_string()))?;
            self.tree.insert(key, bytes)?;
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.tree.remove(key)?;
        Ok(())
    }

    async fn release_if_match(&self, key: &str, expected: &str) -> Result<bool> {
        match self.read_live(key)? {
            Some(entry) if entry.value == expected => {
                self.tree.remove(key)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn kv() -> (TempDir, SledKv) {
        let dir = TempDir::new().unwrap();
        let kv = SledKv::new(dir.path()).unwrap();
        (dir, kv)
    }

    #[tokio::test]
    async fn set_nx_ex_refuses_a_second_set_until_expiry() {
        let (_dir, kv) = kv();
        assert!(kv.set_nx_ex("lock:a", "token-1", 60).await.unwrap());
        assert!(!kv.set_nx_ex("lock:a", "token-2", 60).await.unwrap());
        assert_eq!(kv.get("lock:a").await.unwrap().as_deref(), Some("token-1"));
    }

    #[tokio::test]
    async fn incr_creates_and_increments() {
        let (_dir, kv) = kv();
        assert_eq!(kv.incr("counter:a").await.unwrap(), 1);
        assert_eq!(kv.incr("counter:a").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn release_if_match_only_releases_the_matching_holder() {
        let (_dir, kv) = kv();
        kv.set_nx_ex("lock:a", "token-1", 60).await.unwrap();
        assert!(!kv.release_if_match("lock:a", "token-2").await.unwrap());
        assert!(kv.release_if_match("lock:a", "token-1").await.unwrap());
        assert!(kv.get("lock:a").await.unwrap().is_none());
    }
}
