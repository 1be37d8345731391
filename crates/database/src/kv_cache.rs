//! Backing table for the cross-process KV cache and its advisory
//! locks. Values carry an absolute expiry; readers never see expired
//! entries and writers overwrite them freely.

use sqlx::{
    PgConnection,
    types::chrono::{DateTime, Utc},
};

/// Non-expired value for `key`.
pub async fn get(ex: &mut PgConnection, key: &str) -> Result<Option<String>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT value
FROM kv_cache
WHERE key = $1 AND expires_at > now()
    "#;
    let row: Option<(String,)> = sqlx::query_as(QUERY).bind(key).fetch_optional(ex).await?;
    Ok(row.map(|(value,)| value))
}

/// Unconditionally stores `value` under `key` until `expires_at`.
pub async fn set(
    ex: &mut PgConnection,
    key: &str,
    value: &str,
    expires_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO kv_cache (key, value, expires_at)
VALUES ($1, $2, $3)
ON CONFLICT (key) DO UPDATE
SET value = excluded.value,
    expires_at = excluded.expires_at
    "#;
    sqlx::query(QUERY)
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(ex)
        .await
        .map(|_| ())
}

pub async fn delete(ex: &mut PgConnection, key: &str) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
DELETE FROM kv_cache
WHERE key = $1
    "#;
    sqlx::query(QUERY).bind(key).execute(ex).await.map(|_| ())
}

/// Set-if-absent with TTL: succeeds when the key is free or its
/// previous holder expired. This is the single-flight lock primitive.
pub async fn try_acquire(
    ex: &mut PgConnection,
    key: &str,
    value: &str,
    expires_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO kv_cache (key, value, expires_at)
VALUES ($1, $2, $3)
ON CONFLICT (key) DO UPDATE
SET value = excluded.value,
    expires_at = excluded.expires_at
WHERE kv_cache.expires_at <= now()
RETURNING key
    "#;
    let row: Option<(String,)> = sqlx::query_as(QUERY)
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .fetch_optional(ex)
        .await?;
    Ok(row.is_some())
}

/// Whether a non-expired entry exists for `key`.
pub async fn exists(ex: &mut PgConnection, key: &str) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
SELECT EXISTS (
    SELECT 1
    FROM kv_cache
    WHERE key = $1 AND expires_at > now()
)
    "#;
    let (exists,): (bool,) = sqlx::query_as(QUERY).bind(key).fetch_one(ex).await?;
    Ok(exists)
}

/// Drops expired entries. Run opportunistically; correctness never
/// depends on it because every read filters on `expires_at`.
pub async fn purge_expired(ex: &mut PgConnection) -> Result<u64, sqlx::Error> {
    const QUERY: &str = r#"
DELETE FROM kv_cache
WHERE expires_at <= now()
    "#;
    sqlx::query(QUERY)
        .execute(ex)
        .await
        .map(|result| result.rows_affected())
}
