//! Cross-process KV cache and advisory locks.
//!
//! This is the only coordination point shared between workers. It rides
//! the Postgres pool in autocommit mode on purpose: cache entries and
//! locks must stay visible to other workers and must survive a caller's
//! rolled-back transaction (dry runs still record their LLM payloads).
//!
//! Locks are advisory single-flight guards (set-if-absent + TTL), not
//! mutexes; the unique database constraints remain the ground truth.

use {
    chrono::Utc,
    serde::{Serialize, de::DeserializeOwned},
    sqlx::PgPool,
    std::time::Duration,
};

pub mod ttl {
    use std::time::Duration;

    pub const SHOPPING_CACHE: Duration = Duration::from_secs(60 * 60);
    pub const DETAIL_CACHE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
    /// Merchant URLs resolved by offer id for the redirect path.
    pub const MERCHANT_URL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
    pub const FX_RATES: Duration = Duration::from_secs(60 * 60);
    pub const LLM_PARSE: Duration = Duration::from_secs(180 * 24 * 60 * 60);
    pub const LLM_PARSE_LOCK: Duration = Duration::from_secs(60);
    pub const SUGGEST_CACHE: Duration = Duration::from_secs(24 * 60 * 60);
    pub const SUGGEST_LOCK: Duration = Duration::from_secs(5 * 60);
    pub const DEBUG_PAYLOAD: Duration = Duration::from_secs(24 * 60 * 60);
}

pub mod prefix {
    pub const SHOPPING: &str = "shopping:";
    pub const DETAIL: &str = "detail:";
    pub const MERCHANT_URL: &str = "merchant_url:";
    pub const FX_RATES: &str = "fx:rates:";
    pub const LLM_PARSE: &str = "llm:parse:";
    pub const SUGGEST: &str = "llm:patterns:suggest:";
    pub const DEBUG: &str = "debug:";
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Clone, Debug)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut ex = self.pool.acquire().await?;
        Ok(database::kv_cache::get(&mut ex, key).await?)
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut ex = self.pool.acquire().await?;
        let expires_at = Utc::now() + ttl;
        Ok(database::kv_cache::set(&mut ex, key, value, expires_at).await?)
    }

    /// Reads and deserializes a cached JSON payload. A stored value
    /// that no longer deserializes counts as a miss, not an error.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(stored) = self.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&stored) {
            Ok(value) => Ok(Some(value)),
            Err(error) => {
                tracing::warn!(key, ?error, "discarding undeserializable cache entry");
                Ok(None)
            }
        }
    }

    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(value)?;
        self.set(key, &serialized, ttl).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut ex = self.pool.acquire().await?;
        Ok(database::kv_cache::delete(&mut ex, key).await?)
    }

    /// Set-if-absent lock acquisition. `false` means another worker
    /// holds the key; callers treat that as "skip this pass".
    pub async fn acquire_lock(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut ex = self.pool.acquire().await?;
        let expires_at = Utc::now() + ttl;
        Ok(database::kv_cache::try_acquire(&mut ex, key, "1", expires_at).await?)
    }

    pub async fn release_lock(&self, key: &str) -> Result<(), StoreError> {
        self.delete(key).await
    }

    pub async fn is_locked(&self, key: &str) -> Result<bool, StoreError> {
        let mut ex = self.pool.acquire().await?;
        Ok(database::kv_cache::exists(&mut ex, key).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> Store {
        let pool = PgPool::connect("postgresql://").await.unwrap();
        database::clear_DANGER(&pool).await.unwrap();
        Store::new(pool)
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_json_round_trip() {
        let store = store().await;
        store
            .set_json("t:json", &vec![1, 2, 3], Duration::from_secs(60))
            .await
            .unwrap();
        let read: Option<Vec<i32>> = store.get_json("t:json").await.unwrap();
        assert_eq!(read, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_undeserializable_entry_is_a_miss() {
        let store = store().await;
        store
            .set("t:bad", "not json", Duration::from_secs(60))
            .await
            .unwrap();
        let read: Option<Vec<i32>> = store.get_json("t:bad").await.unwrap();
        assert_eq!(read, None);
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_lock_single_flight() {
        let store = store().await;
        assert!(store
            .acquire_lock("t:lock", Duration::from_secs(60))
            .await
            .unwrap());
        assert!(!store
            .acquire_lock("t:lock", Duration::from_secs(60))
            .await
            .unwrap());
        assert!(store.is_locked("t:lock").await.unwrap());
        store.release_lock("t:lock").await.unwrap();
        assert!(store
            .acquire_lock("t:lock", Duration::from_secs(60))
            .await
            .unwrap());
    }
}
