use crate::error::Result;
use crate::kv::KvStore;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

/// Process-local `KvStore` for unit tests (§13) that don't need Sled's on-disk durability.
#[derive(Default)]
pub struct InMemoryKv {
    entries: DashMap<String, Entry>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(entry: &Entry) -> bool {
        entry.expires_at.map(|t| t > Instant::now()).unwrap_or(true)
    }
}

#[async_trait]
impl KvStore for InMemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entries.get(key) {
            Some(entry) if Self::is_live(&entry) => Ok(Some(entry.value.clone())),
            Some(_) => {
                self.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool> {
        if let Some(existing) = self.entries.get(key) {
            if Self::is_live(&existing) {
                return Ok(false);
            }
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(true)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: None,
        });
        let next: i64 = entry.value.parse().unwrap_or(0) + 1;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<()> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn release_if_match(&self, key: &str, expected: &str) -> Result<bool> {
        let matches = self
            .entries
            .get(key)
            .map(|e| Self::is_live(&e) && e.value == expected)
            .unwrap_or(false);
        if matches {
            self.entries.remove(key);
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_nx_ex_and_release() {
        let kv = InMemoryKv::new();
        assert!(kv.set_nx_ex("lock:a", "t1", 60).await.unwrap());
        assert!(!kv.set_nx_ex("lock:a", "t2", 60).await.unwrap());
        assert!(kv.release_if_match("lock:a", "t1").await.unwrap());
        assert!(kv.set_nx_ex("lock:a", "t2", 60).await.unwrap());
    }

    #[tokio::test]
    async fn incr_counts_up() {
        let kv = InMemoryKv::new();
        assert_eq!(kv.incr("c").await.unwrap(), 1);
        assert_eq!(kv.incr("c").await.unwrap(), 2);
        assert_eq!(kv.incr("c").await.unwrap(), 3);
    }
}
