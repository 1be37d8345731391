//! The curated Golden SKU catalog. Read-mostly: rows are only written
//! by the seed tool and admin actions, never by ingestion.

use sqlx::{
    PgConnection,
    types::chrono::{DateTime, Utc},
};

pub type SkuId = i64;

/// One row in the `golden_skus` table.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct GoldenSku {
    pub id: SkuId,
    pub sku_key: String,
    pub model: String,
    pub storage: String,
    pub color: String,
    pub condition: String,
    pub sim_variant: Option<String>,
    pub lock_state: Option<String>,
    pub region_variant: Option<String>,
    pub display_name: String,
    pub msrp_usd: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Catalog entry as written by the seed tool.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewGoldenSku {
    pub sku_key: String,
    pub model: String,
    pub storage: String,
    pub color: String,
    pub condition: String,
    pub sim_variant: Option<String>,
    pub lock_state: Option<String>,
    pub region_variant: Option<String>,
    pub display_name: String,
    pub msrp_usd: Option<f64>,
}

/// Upserts a catalog entry on `sku_key`. Display name and MSRP are
/// refreshed; the key-forming attributes are immutable by construction.
pub async fn upsert(ex: &mut PgConnection, sku: &NewGoldenSku) -> Result<SkuId, sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO golden_skus (
    sku_key,
    model,
    storage,
    color,
    condition,
    sim_variant,
    lock_state,
    region_variant,
    display_name,
    msrp_usd,
    created_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now())
ON CONFLICT (sku_key) DO UPDATE
SET display_name = excluded.display_name,
    msrp_usd = excluded.msrp_usd
RETURNING id
    "#;
    let (id,) = sqlx::query_as(QUERY)
        .bind(&sku.sku_key)
        .bind(&sku.model)
        .bind(&sku.storage)
        .bind(&sku.color)
        .bind(&sku.condition)
        .bind(&sku.sim_variant)
        .bind(&sku.lock_state)
        .bind(&sku.region_variant)
        .bind(&sku.display_name)
        .bind(sku.msrp_usd)
        .fetch_one(ex)
        .await?;
    Ok(id)
}

pub async fn find_by_sku_key(
    ex: &mut PgConnection,
    sku_key: &str,
) -> Result<Option<GoldenSku>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT *
FROM golden_skus
WHERE sku_key = $1
    "#;
    sqlx::query_as(QUERY).bind(sku_key).fetch_optional(ex).await
}

/// Candidate keys for LLM candidate-set matching, scoped by model and
/// condition (and storage when known). Ordered by `sku_key` so the
/// candidate list, and therefore its fingerprint, is stable across runs.
pub async fn candidate_sku_keys(
    ex: &mut PgConnection,
    model: &str,
    condition: &str,
    storage: Option<&str>,
    limit: i64,
) -> Result<Vec<String>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT sku_key
FROM golden_skus
WHERE model = $1
    AND condition = $2
    AND ($3::text IS NULL OR storage = $3)
ORDER BY sku_key
LIMIT $4
    "#;
    let rows: Vec<(String,)> = sqlx::query_as(QUERY)
        .bind(model)
        .bind(condition)
        .bind(storage)
        .bind(limit)
        .fetch_all(ex)
        .await?;
    Ok(rows.into_iter().map(|(key,)| key).collect())
}

#[cfg(test)]
mod tests {
    use {super::*, sqlx::Connection};

    fn sku(key: &str, model: &str, storage: &str, color: &str) -> NewGoldenSku {
        NewGoldenSku {
            sku_key: key.to_string(),
            model: model.to_string(),
            storage: storage.to_string(),
            color: color.to_string(),
            condition: "new".to_string(),
            display_name: key.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_upsert_and_candidates() {
        let mut db = sqlx::PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let id = upsert(
            &mut db,
            &sku("iphone-16-pro-256gb-black-new", "iphone-16-pro", "256gb", "black"),
        )
        .await
        .unwrap();

        // Upserting the same key again keeps the id.
        let mut updated = sku(
            "iphone-16-pro-256gb-black-new",
            "iphone-16-pro",
            "256gb",
            "black",
        );
        updated.msrp_usd = Some(1099.);
        let id2 = upsert(&mut db, &updated).await.unwrap();
        assert_eq!(id, id2);
        let found = find_by_sku_key(&mut db, "iphone-16-pro-256gb-black-new")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.msrp_usd, Some(1099.));

        upsert(
            &mut db,
            &sku("iphone-16-pro-512gb-black-new", "iphone-16-pro", "512gb", "black"),
        )
        .await
        .unwrap();
        upsert(
            &mut db,
            &sku("iphone-16-128gb-blue-new", "iphone-16", "128gb", "blue"),
        )
        .await
        .unwrap();

        let keys = candidate_sku_keys(&mut db, "iphone-16-pro", "new", None, 50)
            .await
            .unwrap();
        assert_eq!(
            keys,
            vec![
                "iphone-16-pro-256gb-black-new".to_string(),
                "iphone-16-pro-512gb-black-new".to_string(),
            ]
        );

        let keys = candidate_sku_keys(&mut db, "iphone-16-pro", "new", Some("512gb"), 50)
            .await
            .unwrap();
        assert_eq!(keys, vec!["iphone-16-pro-512gb-black-new".to_string()]);
    }
}
