//! Promoted, ranking-ready offers. Created only by the reconciler;
//! globally deduplicated by the unique `dedup_key`.

use sqlx::{
    PgConnection,
    types::chrono::{DateTime, Utc},
};

pub type OfferId = i64;

/// One row in the `offers` table.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Offer {
    pub id: OfferId,
    pub offer_id: String,
    pub sku_id: i64,
    pub merchant_id: Option<i64>,
    pub dedup_key: String,
    pub country_code: String,
    pub country: String,
    pub city: Option<String>,
    pub price: f64,
    pub currency: String,
    pub price_usd: f64,
    pub final_effective_price: f64,
    pub local_price_formatted: String,
    pub shop_name: String,
    pub trust_score: i32,
    pub trust_reason_codes_json: Option<String>,
    pub availability: String,
    pub condition: String,
    pub sim_type: Option<String>,
    pub warranty: Option<String>,
    pub restriction_alert: Option<String>,
    pub product_link: String,
    pub merchant_url: Option<String>,
    pub detail_token: Option<String>,
    pub unknown_shipping: bool,
    pub unknown_refund: bool,
    pub source: String,
    pub source_product_id: Option<String>,
    pub match_confidence: f64,
    pub match_reason_codes_json: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An offer about to be promoted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewOffer {
    pub offer_id: String,
    pub sku_id: i64,
    pub merchant_id: Option<i64>,
    pub dedup_key: String,
    pub country_code: String,
    pub country: String,
    pub city: Option<String>,
    pub price: f64,
    pub currency: String,
    pub price_usd: f64,
    pub final_effective_price: f64,
    pub local_price_formatted: String,
    pub shop_name: String,
    pub trust_score: i32,
    pub trust_reason_codes_json: Option<String>,
    pub availability: String,
    pub condition: String,
    pub sim_type: Option<String>,
    pub warranty: Option<String>,
    pub restriction_alert: Option<String>,
    pub product_link: String,
    pub merchant_url: Option<String>,
    pub detail_token: Option<String>,
    pub unknown_shipping: bool,
    pub unknown_refund: bool,
    pub source: String,
    pub source_product_id: Option<String>,
    pub match_confidence: f64,
    pub match_reason_codes_json: Option<String>,
}

pub async fn insert(ex: &mut PgConnection, offer: &NewOffer) -> Result<OfferId, sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO offers (
    offer_id,
    sku_id,
    merchant_id,
    dedup_key,
    country_code,
    country,
    city,
    price,
    currency,
    price_usd,
    final_effective_price,
    local_price_formatted,
    shop_name,
    trust_score,
    trust_reason_codes_json,
    availability,
    condition,
    sim_type,
    warranty,
    restriction_alert,
    product_link,
    merchant_url,
    detail_token,
    unknown_shipping,
    unknown_refund,
    source,
    source_product_id,
    match_confidence,
    match_reason_codes_json,
    fetched_at,
    updated_at
)
VALUES (
    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
    $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
    $21, $22, $23, $24, $25, $26, $27, $28, $29, now(), now()
)
RETURNING id
    "#;
    let (id,) = sqlx::query_as(QUERY)
        .bind(&offer.offer_id)
        .bind(offer.sku_id)
        .bind(offer.merchant_id)
        .bind(&offer.dedup_key)
        .bind(&offer.country_code)
        .bind(&offer.country)
        .bind(&offer.city)
        .bind(offer.price)
        .bind(&offer.currency)
        .bind(offer.price_usd)
        .bind(offer.final_effective_price)
        .bind(&offer.local_price_formatted)
        .bind(&offer.shop_name)
        .bind(offer.trust_score)
        .bind(&offer.trust_reason_codes_json)
        .bind(&offer.availability)
        .bind(&offer.condition)
        .bind(&offer.sim_type)
        .bind(&offer.warranty)
        .bind(&offer.restriction_alert)
        .bind(&offer.product_link)
        .bind(&offer.merchant_url)
        .bind(&offer.detail_token)
        .bind(offer.unknown_shipping)
        .bind(offer.unknown_refund)
        .bind(&offer.source)
        .bind(&offer.source_product_id)
        .bind(offer.match_confidence)
        .bind(&offer.match_reason_codes_json)
        .fetch_one(ex)
        .await?;
    Ok(id)
}

pub async fn find_by_dedup_key(
    ex: &mut PgConnection,
    dedup_key: &str,
) -> Result<Option<Offer>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT *
FROM offers
WHERE dedup_key = $1
    "#;
    sqlx::query_as(QUERY)
        .bind(dedup_key)
        .fetch_optional(ex)
        .await
}

/// Refreshes the USD pricing of an already-promoted offer. Used when a
/// later run sees the same dedup key with fresher FX.
pub async fn update_usd_prices(
    ex: &mut PgConnection,
    id: OfferId,
    price_usd: f64,
    final_effective_price: f64,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
UPDATE offers
SET price_usd = $2,
    final_effective_price = $3,
    updated_at = now()
WHERE id = $1
    "#;
    sqlx::query(QUERY)
        .bind(id)
        .bind(price_usd)
        .bind(final_effective_price)
        .execute(ex)
        .await
        .map(|_| ())
}
