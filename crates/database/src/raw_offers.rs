//! The raw buffer: every paid provider row is stored verbatim before
//! any SKU linkage so a failed match never throws away a paid result.
//!
//! Row identity is `(source, country_code, source_product_id)` when the
//! provider gave us a product id, otherwise
//! `(source, country_code, product_link_hash)`.

use sqlx::{
    PgConnection,
    types::chrono::{DateTime, Utc},
};

pub type RawOfferId = i64;

/// One row in the `raw_offers` table.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct RawOffer {
    pub id: RawOfferId,
    pub raw_offer_id: String,
    pub source: String,
    pub source_request_key: String,
    pub source_product_id: Option<String>,
    pub country_code: String,
    pub title_raw: String,
    pub merchant_name: String,
    pub product_link: String,
    pub product_link_hash: String,
    pub detail_token: Option<String>,
    pub second_hand_condition: Option<String>,
    pub thumbnail: Option<String>,
    pub price_local: f64,
    pub currency: String,
    pub parsed_attrs_json: Option<String>,
    pub flags_json: Option<String>,
    pub match_reason_codes_json: Option<String>,
    pub matched_sku_id: Option<i64>,
    pub match_confidence: Option<f64>,
    pub ingested_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A provider row as handed to the writer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewRawOffer {
    pub raw_offer_id: String,
    pub source: String,
    pub source_request_key: String,
    pub source_product_id: Option<String>,
    pub country_code: String,
    pub title_raw: String,
    pub merchant_name: String,
    pub product_link: String,
    pub product_link_hash: String,
    pub detail_token: Option<String>,
    pub second_hand_condition: Option<String>,
    pub thumbnail: Option<String>,
    pub price_local: f64,
    pub currency: String,
    pub parsed_attrs_json: Option<String>,
    pub flags_json: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Upserted {
    pub id: RawOfferId,
    pub inserted: bool,
}

/// Idempotently writes a provider row into the buffer. Updates refresh
/// the descriptive fields and the request key but never touch
/// `matched_sku_id` / `match_confidence`.
pub async fn upsert(ex: &mut PgConnection, raw: &NewRawOffer) -> Result<Upserted, sqlx::Error> {
    // `xmax = 0` distinguishes a fresh insert from a conflict update.
    const QUERY_BY_PRODUCT_ID: &str = r#"
INSERT INTO raw_offers (
    raw_offer_id,
    source,
    source_request_key,
    source_product_id,
    country_code,
    title_raw,
    merchant_name,
    product_link,
    product_link_hash,
    detail_token,
    second_hand_condition,
    thumbnail,
    price_local,
    currency,
    parsed_attrs_json,
    flags_json,
    ingested_at,
    updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, now(), now())
ON CONFLICT (source, country_code, source_product_id) WHERE source_product_id IS NOT NULL
DO UPDATE SET
    source_request_key = excluded.source_request_key,
    title_raw = excluded.title_raw,
    merchant_name = excluded.merchant_name,
    product_link = excluded.product_link,
    product_link_hash = excluded.product_link_hash,
    detail_token = excluded.detail_token,
    second_hand_condition = excluded.second_hand_condition,
    thumbnail = excluded.thumbnail,
    price_local = excluded.price_local,
    currency = excluded.currency,
    parsed_attrs_json = excluded.parsed_attrs_json,
    flags_json = excluded.flags_json,
    updated_at = now()
RETURNING id, (xmax = 0) AS inserted
    "#;
    const QUERY_BY_LINK_HASH: &str = r#"
INSERT INTO raw_offers (
    raw_offer_id,
    source,
    source_request_key,
    source_product_id,
    country_code,
    title_raw,
    merchant_name,
    product_link,
    product_link_hash,
    detail_token,
    second_hand_condition,
    thumbnail,
    price_local,
    currency,
    parsed_attrs_json,
    flags_json,
    ingested_at,
    updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, now(), now())
ON CONFLICT (source, country_code, product_link_hash)
DO UPDATE SET
    source_request_key = excluded.source_request_key,
    title_raw = excluded.title_raw,
    merchant_name = excluded.merchant_name,
    product_link = excluded.product_link,
    detail_token = excluded.detail_token,
    second_hand_condition = excluded.second_hand_condition,
    thumbnail = excluded.thumbnail,
    price_local = excluded.price_local,
    currency = excluded.currency,
    parsed_attrs_json = excluded.parsed_attrs_json,
    flags_json = excluded.flags_json,
    updated_at = now()
RETURNING id, (xmax = 0) AS inserted
    "#;
    let query = if raw.source_product_id.is_some() {
        QUERY_BY_PRODUCT_ID
    } else {
        QUERY_BY_LINK_HASH
    };
    let (id, inserted) = sqlx::query_as(query)
        .bind(&raw.raw_offer_id)
        .bind(&raw.source)
        .bind(&raw.source_request_key)
        .bind(&raw.source_product_id)
        .bind(&raw.country_code)
        .bind(&raw.title_raw)
        .bind(&raw.merchant_name)
        .bind(&raw.product_link)
        .bind(&raw.product_link_hash)
        .bind(&raw.detail_token)
        .bind(&raw.second_hand_condition)
        .bind(&raw.thumbnail)
        .bind(raw.price_local)
        .bind(&raw.currency)
        .bind(&raw.parsed_attrs_json)
        .bind(&raw.flags_json)
        .fetch_one(ex)
        .await?;
    Ok(Upserted { id, inserted })
}

/// Unlinked rows in ingestion order: older rows get matched first.
pub async fn select_unmatched(
    ex: &mut PgConnection,
    country_code: Option<&str>,
    limit: i64,
) -> Result<Vec<RawOffer>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT *
FROM raw_offers
WHERE matched_sku_id IS NULL
    AND ($1::text IS NULL OR country_code = $1)
ORDER BY ingested_at ASC
LIMIT $2
    "#;
    sqlx::query_as(QUERY)
        .bind(country_code)
        .bind(limit)
        .fetch_all(ex)
        .await
}

/// Persists the reconciler's per-row decisions: side-car snapshots,
/// reason codes and (when matched) the SKU linkage. Descriptive fields
/// are left alone.
pub async fn update_decisions(ex: &mut PgConnection, raw: &RawOffer) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
UPDATE raw_offers
SET parsed_attrs_json = $2,
    flags_json = $3,
    match_reason_codes_json = $4,
    matched_sku_id = $5,
    match_confidence = $6,
    updated_at = now()
WHERE id = $1
    "#;
    sqlx::query(QUERY)
        .bind(raw.id)
        .bind(&raw.parsed_attrs_json)
        .bind(&raw.flags_json)
        .bind(&raw.match_reason_codes_json)
        .bind(raw.matched_sku_id)
        .bind(raw.match_confidence)
        .execute(ex)
        .await
        .map(|_| ())
}

/// Most recent `(title, product_link)` pairs for the pattern suggester.
pub async fn sample_recent(
    ex: &mut PgConnection,
    limit: i64,
) -> Result<Vec<(String, String)>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT title_raw, product_link
FROM raw_offers
ORDER BY ingested_at DESC
LIMIT $1
    "#;
    sqlx::query_as(QUERY).bind(limit).fetch_all(ex).await
}

pub async fn find_by_id(
    ex: &mut PgConnection,
    id: RawOfferId,
) -> Result<Option<RawOffer>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT *
FROM raw_offers
WHERE id = $1
    "#;
    sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await
}

pub async fn find_by_public_id(
    ex: &mut PgConnection,
    raw_offer_id: &str,
) -> Result<Option<RawOffer>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT *
FROM raw_offers
WHERE raw_offer_id = $1
    "#;
    sqlx::query_as(QUERY)
        .bind(raw_offer_id)
        .fetch_optional(ex)
        .await
}

#[cfg(test)]
mod tests {
    use {super::*, sqlx::Connection};

    fn raw(product_id: Option<&str>, link: &str) -> NewRawOffer {
        NewRawOffer {
            raw_offer_id: format!("raw-{link}"),
            source: "shopping_search".to_string(),
            source_request_key: "0".repeat(64),
            source_product_id: product_id.map(str::to_string),
            country_code: "US".to_string(),
            title_raw: "Apple iPhone 16 Pro 256GB Black".to_string(),
            merchant_name: "Apple".to_string(),
            product_link: format!("https://x/{link}"),
            product_link_hash: format!("{link:0<32}"),
            price_local: 1099.,
            currency: "USD".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_upsert_by_product_id_is_idempotent() {
        let mut db = sqlx::PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let first = upsert(&mut db, &raw(Some("p-1"), "a")).await.unwrap();
        assert!(first.inserted);

        let mut updated = raw(Some("p-1"), "a");
        updated.price_local = 999.;
        let second = upsert(&mut db, &updated).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(!second.inserted);

        let stored = find_by_id(&mut db, first.id).await.unwrap().unwrap();
        assert_eq!(stored.price_local, 999.);
        assert_eq!(stored.matched_sku_id, None);
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_upsert_by_link_hash_when_product_id_missing() {
        let mut db = sqlx::PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let first = upsert(&mut db, &raw(None, "b")).await.unwrap();
        let second = upsert(&mut db, &raw(None, "b")).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(!second.inserted);
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_decisions_do_not_touch_descriptive_fields() {
        let mut db = sqlx::PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let upserted = upsert(&mut db, &raw(Some("p-2"), "c")).await.unwrap();
        let mut stored = find_by_id(&mut db, upserted.id).await.unwrap().unwrap();
        stored.match_reason_codes_json = Some(r#"["MISSING_REQUIRED_ATTRS"]"#.to_string());
        update_decisions(&mut db, &stored).await.unwrap();

        let reloaded = find_by_id(&mut db, upserted.id).await.unwrap().unwrap();
        assert_eq!(
            reloaded.match_reason_codes_json.as_deref(),
            Some(r#"["MISSING_REQUIRED_ATTRS"]"#)
        );
        assert_eq!(reloaded.title_raw, stored.title_raw);
    }
}
