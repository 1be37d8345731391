//! Read-only debugging view of one raw buffer row: what the pipeline
//! saw, what it decided, and what it would do next. Transport is up to
//! the hosting code.

use {
    anyhow::Result,
    database::{golden_skus, raw_offers::RawOffer},
    model::{Condition, ListingFlags, ParsedAttrs},
    sqlx::PgConnection,
};

/// What the pattern engine reads out of the title and URL hint.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct PatternExplain {
    pub condition_hint: Option<String>,
    pub condition_hint_phrases: Vec<String>,
}

/// What the deterministic extractor makes of the title right now (as
/// opposed to the stored snapshot from the last reconcile pass).
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct DeterministicExplain {
    pub model: Option<String>,
    pub storage: Option<String>,
    pub color: Option<String>,
    pub confidence: String,
    pub normalized_condition: String,
    pub computed_sku_key: Option<String>,
    pub computed_sku_key_in_catalog: bool,
}

/// Stored LLM attempt state plus whether a reconcile pass would call
/// the matcher for this row now.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct LlmExplain {
    pub attempted: bool,
    pub chosen_sku_key: Option<String>,
    pub match_confidence: Option<f64>,
    pub candidates_count: Option<usize>,
    pub candidates_fingerprint: Option<String>,
    pub would_call_now: bool,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct RawOfferExplain {
    pub raw_offer_id: String,
    pub source: String,
    pub source_product_id: Option<String>,
    pub country_code: String,
    pub title: String,
    pub merchant_name: String,
    pub second_hand_condition: Option<String>,
    pub price_local: f64,
    pub currency: String,
    pub flags: ListingFlags,
    pub match_reason_codes: Vec<String>,
    pub matched_sku_id: Option<i64>,
    pub match_confidence: Option<f64>,
    pub deterministic: DeterministicExplain,
    pub patterns: PatternExplain,
    pub llm: LlmExplain,
    pub parsed_attrs_snapshot: ParsedAttrs,
}

/// Finds a raw offer by numeric id or public `raw_offer_id`.
pub async fn find_raw_offer(
    ex: &mut PgConnection,
    reference: &str,
) -> Result<Option<RawOffer>, sqlx::Error> {
    if let Ok(id) = reference.parse::<i64>() {
        return database::raw_offers::find_by_id(ex, id).await;
    }
    database::raw_offers::find_by_public_id(ex, reference).await
}

/// Assembles the explain view for one raw offer. `llm_usable` is
/// whether the deployment has the matcher configured at all.
pub async fn explain_raw_offer(
    ex: &mut PgConnection,
    raw: &RawOffer,
    llm_usable: bool,
) -> Result<RawOfferExplain> {
    let extracted = extraction::extract_attributes(&raw.title_raw);
    let condition = Condition::from_second_hand(raw.second_hand_condition.as_deref());

    let computed_sku_key = match (&extracted.model, &extracted.storage, &extracted.color) {
        (Some(model), Some(storage), Some(color)) => {
            Some(sku_keys::compose_sku_key(&sku_keys::SkuAttributes {
                model: model.clone(),
                storage: storage.clone(),
                color: color.clone(),
                condition: condition.to_string(),
                ..Default::default()
            }))
        }
        _ => None,
    };
    let computed_sku_key_in_catalog = match &computed_sku_key {
        Some(sku_key) => golden_skus::find_by_sku_key(ex, sku_key).await?.is_some(),
        None => false,
    };

    let parsed = ParsedAttrs::from_json(raw.parsed_attrs_json.as_deref());
    let (attempted, chosen, confidence) = parsed.llm_state();
    let would_call_now = llm_usable
        && !attempted
        && extracted.model.is_some()
        && (computed_sku_key.is_none() || !computed_sku_key_in_catalog);

    let match_reason_codes = raw
        .match_reason_codes_json
        .as_deref()
        .and_then(|json| serde_json::from_str(json).ok())
        .unwrap_or_default();

    let bundle = crate::reconcile::load_pattern_bundle(ex).await?;
    let (condition_hint, condition_hint_phrases) = patterns::detect_condition_hint(
        Some(&raw.title_raw),
        Some(&raw.product_link),
        &bundle,
    );

    Ok(RawOfferExplain {
        raw_offer_id: raw.raw_offer_id.clone(),
        source: raw.source.clone(),
        source_product_id: raw.source_product_id.clone(),
        country_code: raw.country_code.clone(),
        title: raw.title_raw.clone(),
        merchant_name: raw.merchant_name.clone(),
        second_hand_condition: raw.second_hand_condition.clone(),
        price_local: raw.price_local,
        currency: raw.currency.clone(),
        flags: ListingFlags::from_json(raw.flags_json.as_deref()),
        match_reason_codes,
        matched_sku_id: raw.matched_sku_id,
        match_confidence: raw.match_confidence,
        deterministic: DeterministicExplain {
            model: extracted.model,
            storage: extracted.storage,
            color: extracted.color,
            confidence: extracted.confidence.to_string(),
            normalized_condition: condition.to_string(),
            computed_sku_key,
            computed_sku_key_in_catalog,
        },
        patterns: PatternExplain {
            condition_hint: condition_hint.map(|condition| condition.to_string()),
            condition_hint_phrases,
        },
        llm: LlmExplain {
            attempted,
            chosen_sku_key: chosen.map(str::to_string),
            match_confidence: confidence,
            candidates_count: parsed.llm_candidates_count,
            candidates_fingerprint: parsed.llm_candidates_fingerprint.clone(),
            would_call_now,
        },
        parsed_attrs_snapshot: parsed,
    })
}

#[cfg(test)]
mod tests {
    use {super::*, sqlx::Connection};

    async fn inserted_raw(ex: &mut PgConnection, title: &str, link: &str) -> RawOffer {
        let upserted = database::raw_offers::upsert(
            ex,
            &database::raw_offers::NewRawOffer {
                raw_offer_id: format!("raw-{link}"),
                source: "shopping_search".to_string(),
                source_request_key: "0".repeat(64),
                country_code: "US".to_string(),
                title_raw: title.to_string(),
                merchant_name: "Apple".to_string(),
                product_link: format!("https://x/{link}"),
                product_link_hash: sku_keys::link_hash(&format!("https://x/{link}")),
                price_local: 1099.,
                currency: "USD".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        database::raw_offers::find_by_id(ex, upserted.id)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_explains_deterministic_and_llm_state() {
        let mut db = sqlx::PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        database::clear_DANGER_(&mut db).await.unwrap();

        golden_skus::upsert(
            &mut db,
            &golden_skus::NewGoldenSku {
                sku_key: "iphone-16-pro-256gb-black-new".to_string(),
                model: "iphone-16-pro".to_string(),
                storage: "256gb".to_string(),
                color: "black".to_string(),
                condition: "new".to_string(),
                display_name: "iPhone 16 Pro 256GB Black".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // Fully parseable title whose key is in the catalog: no LLM
        // call needed.
        let raw = inserted_raw(&mut db, "iPhone 16 Pro 256GB Black", "a").await;
        let explained = explain_raw_offer(&mut db, &raw, true).await.unwrap();
        assert_eq!(
            explained.deterministic.computed_sku_key.as_deref(),
            Some("iphone-16-pro-256gb-black-new")
        );
        assert!(explained.deterministic.computed_sku_key_in_catalog);
        assert!(!explained.llm.would_call_now);

        // Missing color: the matcher would run (when configured).
        let raw = inserted_raw(&mut db, "iPhone 16 Pro 256GB", "b").await;
        let explained = explain_raw_offer(&mut db, &raw, true).await.unwrap();
        assert_eq!(explained.deterministic.computed_sku_key, None);
        assert!(explained.llm.would_call_now);
        let explained = explain_raw_offer(&mut db, &raw, false).await.unwrap();
        assert!(!explained.llm.would_call_now);

        let found = find_raw_offer(&mut db, "raw-b").await.unwrap();
        assert!(found.is_some());
        assert_eq!(
            find_raw_offer(&mut db, &raw.id.to_string()).await.unwrap(),
            found
        );

        // Condition hints come from the merged pattern bundle.
        let raw = inserted_raw(&mut db, "iPhone 15 Pro 128GB refurbished", "c").await;
        let explained = explain_raw_offer(&mut db, &raw, false).await.unwrap();
        assert_eq!(explained.patterns.condition_hint.as_deref(), Some("refurbished"));
        assert!(explained
            .patterns
            .condition_hint_phrases
            .contains(&"refurbished".to_string()));
    }
}
