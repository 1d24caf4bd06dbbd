use crate::config::RedisConfig;
use crate::error::Result;
use crate::kv::{KvStore, RedisKv, SledKv};
use std::sync::Arc;

/// Choose the KV backend from `[redis]` config (§10): Redis by default, or the embedded
/// Sled store when `use_embedded` is set (single-replica dev/test deployments).
pub async fn create_kv_store(config: &RedisConfig) -> Result<Arc<dyn KvStore>> {
    if config.use_embedded {
        let path = config
            .embedded_path
            .clone()
            .unwrap_or_else(|| std::path::PathBuf::from("./data/kv"));
        tracing::info!(path = ?path, "initializing embedded Sled KV store");
        let store = SledKv::new(path)?;
        Ok(Arc::new(store))
    } else {
        tracing::info!(url = %config.url, "initializing Redis KV store");
        let store = RedisKv::new(&config.url).await?;
        Ok(Arc::new(store))
    }
}
