//! The reconcile pass: raw buffer → promoted offers.
//!
//! Strictly sequential per invocation; the only suspension hot-spots
//! are the one FX fetch at the start and the budget-bounded LLM calls.
//! Every row ends in exactly one [`RowOutcome`] and always leaves with
//! its reason codes persisted. Rows are isolated in savepoints so one
//! bad row never aborts the run.

use {
    crate::database::Postgres,
    anyhow::{Context, Result},
    database::{
        PgTransaction,
        golden_skus::{self, GoldenSku},
        merchants, offers, pattern_phrases,
        raw_offers::{self, RawOffer},
    },
    fx::{FxRates, FxService},
    kv_store::Store,
    llm_api::{
        LlmClient,
        matcher::{self, MatchRequest},
    },
    model::{
        Condition, ListingFlags, LlmAttempt, ParsedAttrs, country,
        parsed_attrs::{ExtractedAttributes, ExtractionSnapshot},
        price_display,
    },
    patterns::{PatternBundle, PhraseKind},
    sqlx::{Acquire, PgConnection},
    std::collections::BTreeSet,
};

const CANDIDATE_LIMIT: i64 = 50;
const DEBUG_SAMPLE_LIMIT: usize = 25;
const OFFER_SOURCE: &str = "reconcile";

/// Counters of one reconcile invocation. These are the primary
/// user-visible signal of what a pass did.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize)]
pub struct ReconcileStats {
    pub scanned: usize,
    pub skipped_multi_variant: usize,
    pub skipped_contract: usize,
    pub skipped_missing_attrs: usize,
    pub skipped_no_sku: usize,
    pub skipped_fx: usize,
    pub dedup_conflict: usize,
    pub matched_existing_offer: usize,
    pub created_offers: usize,
    pub updated_raw_matches: usize,
    pub row_errors: usize,
    pub llm_budget: usize,
    pub llm_external_calls: usize,
    pub llm_reused: usize,
    pub llm_skipped_budget: usize,
}

/// Bounded samples for debugging a pass.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize)]
pub struct ReconcileDebug {
    pub created_offer_ids: Vec<String>,
    pub matched_raw_offer_ids: Vec<String>,
    pub sample_reason_codes: Vec<String>,
}

impl ReconcileDebug {
    fn push_reason(&mut self, code: &str) {
        if self.sample_reason_codes.len() < DEBUG_SAMPLE_LIMIT {
            self.sample_reason_codes.push(code.to_string());
        }
    }

    fn push_matched(&mut self, raw_offer_id: &str) {
        if self.matched_raw_offer_ids.len() < DEBUG_SAMPLE_LIMIT {
            self.matched_raw_offer_ids.push(raw_offer_id.to_string());
        }
    }

    fn push_created(&mut self, offer_id: &str) {
        if self.created_offer_ids.len() < DEBUG_SAMPLE_LIMIT {
            self.created_offer_ids.push(offer_id.to_string());
        }
    }
}

/// Terminal state of one scanned raw row. The persisted
/// `match_reason_codes` strings derive from this.
#[derive(Clone, Debug, PartialEq)]
pub enum RowOutcome {
    MissingTitle,
    SkipMultiVariant,
    SkipContract,
    MissingAttrs,
    SkuNotInCatalog,
    FxUnavailable,
    DedupConflict,
    LinkedExistingOffer { via_llm: bool },
    CreatedOffer { offer_id: String, via_llm: bool },
}

impl RowOutcome {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::MissingTitle => "MISSING_TITLE",
            Self::SkipMultiVariant => "SKIP_MULTI_VARIANT",
            Self::SkipContract => "SKIP_CONTRACT",
            Self::MissingAttrs => "MISSING_REQUIRED_ATTRS",
            Self::SkuNotInCatalog => "SKU_NOT_IN_CATALOG",
            Self::FxUnavailable => "FX_UNAVAILABLE",
            Self::DedupConflict => "DEDUP_KEY_CONFLICT",
            Self::LinkedExistingOffer { via_llm: false } => "DEDUP_MATCH_EXISTING_OFFER",
            Self::LinkedExistingOffer { via_llm: true } => "LLM_MATCH_EXISTING_OFFER",
            Self::CreatedOffer { via_llm: false, .. } => "DETERMINISTIC_SKU_MATCH",
            Self::CreatedOffer { via_llm: true, .. } => "LLM_MATCH",
        }
    }
}

fn reason_codes_json(code: &str) -> String {
    serde_json::to_string(&[code]).expect("reason codes serialize")
}

/// Multi-variant listings (several storages or "all colors") cannot be
/// promoted: they do not identify a single SKU.
pub fn detect_is_multi_variant(title: &str) -> bool {
    let distinct: BTreeSet<String> = extraction::storage_tokens(title).into_iter().collect();
    if distinct.len() >= 2 {
        return true;
    }
    let lowered = title.to_lowercase();
    ["256gb/512gb", "512gb/1tb", "all colors", "all colour", "all color"]
        .iter()
        .any(|phrase| lowered.contains(phrase))
}

pub struct Reconciler {
    fx: FxService,
    store: Store,
    llm: Option<LlmClient>,
    llm_max_calls: usize,
    llm_max_fraction: f64,
}

enum SkuResolution {
    Matched {
        sku: GoldenSku,
        confidence: f64,
        via_llm: bool,
    },
    NotInCatalog,
    MissingAttrs,
}

impl Reconciler {
    pub fn new(
        fx: FxService,
        store: Store,
        llm: Option<LlmClient>,
        llm_max_calls: usize,
        llm_max_fraction: f64,
    ) -> Self {
        Self {
            fx,
            store,
            llm,
            llm_max_calls,
            llm_max_fraction,
        }
    }

    /// Runs one reconcile pass in its own transaction. `dry_run`
    /// computes full stats and rolls everything back.
    pub async fn reconcile(
        &self,
        db: &Postgres,
        limit: i64,
        country_code: Option<&str>,
        dry_run: bool,
    ) -> Result<(ReconcileStats, ReconcileDebug)> {
        let mut tx = db.0.begin().await.context("begin reconcile transaction")?;
        let result = self.reconcile_in(&mut tx, limit, country_code).await?;
        if dry_run {
            tx.rollback().await.context("rollback dry run")?;
        } else {
            tx.commit().await.context("commit reconcile")?;
        }
        Ok(result)
    }

    /// The pass itself; the caller owns the transaction boundary.
    pub async fn reconcile_in(
        &self,
        tx: &mut PgTransaction<'_>,
        limit: i64,
        country_code: Option<&str>,
    ) -> Result<(ReconcileStats, ReconcileDebug)> {
        let limit = limit.clamp(1, 5000);
        let mut stats = ReconcileStats {
            llm_budget: self.llm_budget(limit),
            ..Default::default()
        };
        let mut debug = ReconcileDebug::default();

        // FX is fetched once for the whole run and is optional: without
        // it, USD rows still promote and everything else skips per row.
        let fx_rates = match self.fx.get_latest("USD", false).await {
            Ok(rates) => Some(rates),
            Err(error) => {
                tracing::warn!(?error, "fx unavailable, non-USD rows will be skipped");
                None
            }
        };

        let bundle = load_pattern_bundle(tx).await?;
        let country_code = country_code.map(str::to_uppercase);
        let raws = raw_offers::select_unmatched(tx, country_code.as_deref(), limit).await?;

        for mut raw in raws {
            stats.scanned += 1;
            Metrics::get().rows_scanned.inc();

            // A savepoint per row: a failing row is rolled back and
            // counted without poisoning the outer transaction.
            let mut savepoint = (&mut *tx).begin().await.context("begin row savepoint")?;
            match self
                .process_row(&mut savepoint, &bundle, fx_rates.as_ref(), &mut stats, &mut raw)
                .await
            {
                Ok(outcome) => {
                    savepoint.commit().await.context("commit row savepoint")?;
                    record_outcome(&outcome, &raw, &mut stats, &mut debug);
                }
                Err(error) => {
                    tracing::error!(raw_offer_id = %raw.raw_offer_id, ?error, "row failed");
                    savepoint.rollback().await.context("rollback row savepoint")?;
                    stats.row_errors += 1;
                }
            }
        }

        Metrics::get()
            .offers_created
            .inc_by(stats.created_offers as u64);
        tracing::info!(?stats, "reconcile pass finished");
        Ok((stats, debug))
    }

    fn llm_budget(&self, limit: i64) -> usize {
        let fraction_cap = (limit as f64 * self.llm_max_fraction).floor() as usize;
        self.llm_max_calls.min(fraction_cap)
    }

    async fn process_row(
        &self,
        ex: &mut PgConnection,
        bundle: &PatternBundle,
        fx_rates: Option<&FxRates>,
        stats: &mut ReconcileStats,
        raw: &mut RawOffer,
    ) -> Result<RowOutcome> {
        let title = raw.title_raw.clone();
        if title.trim().is_empty() {
            return finish(ex, raw, RowOutcome::MissingTitle).await;
        }

        let is_multi_variant = detect_is_multi_variant(&title);
        let is_contract = patterns::detect_is_contract(Some(&title), Some(&raw.product_link), bundle);
        raw.flags_json = Some(
            ListingFlags {
                is_multi_variant,
                is_contract,
            }
            .to_json(),
        );
        if is_multi_variant {
            return finish(ex, raw, RowOutcome::SkipMultiVariant).await;
        }
        if is_contract {
            return finish(ex, raw, RowOutcome::SkipContract).await;
        }

        let extracted = extraction::extract_attributes(&title);
        let condition = Condition::from_second_hand(raw.second_hand_condition.as_deref());

        // Snapshot the extraction without losing LLM fields a previous
        // run may have written.
        let mut parsed = ParsedAttrs::from_json(raw.parsed_attrs_json.as_deref());
        parsed.record_extraction(
            ExtractionSnapshot {
                attributes: ExtractedAttributes {
                    model: extracted.model.clone(),
                    storage: extracted.storage.clone(),
                    color: extracted.color.clone(),
                    condition: Some(condition.to_string()),
                },
                confidence: extracted.confidence.to_string(),
            },
            raw.second_hand_condition.as_deref(),
            condition.as_ref(),
        );
        raw.parsed_attrs_json = Some(parsed.to_json());

        let resolution = self
            .resolve_sku(ex, stats, raw, &mut parsed, &extracted, condition)
            .await?;
        let (sku, confidence, via_llm) = match resolution {
            SkuResolution::Matched {
                sku,
                confidence,
                via_llm,
            } => (sku, confidence, via_llm),
            SkuResolution::NotInCatalog => {
                return finish(ex, raw, RowOutcome::SkuNotInCatalog).await;
            }
            SkuResolution::MissingAttrs => {
                return finish(ex, raw, RowOutcome::MissingAttrs).await;
            }
        };

        let Some(price_usd) = self.price_usd(raw, fx_rates).await else {
            return finish(ex, raw, RowOutcome::FxUnavailable).await;
        };

        let normalized_merchant = model::merchant::normalize_merchant_name(&raw.merchant_name);
        let tier = trust::merchant_tier(&raw.merchant_name);
        let merchant = merchants::find_or_create(
            ex,
            &raw.merchant_name,
            &normalized_merchant,
            tier.as_ref(),
        )
        .await?;

        let dedup_key = sku_keys::compose_dedup_key(
            &raw.merchant_name,
            raw.price_local,
            &raw.currency,
            Some(raw.product_link.as_str()).filter(|link| !link.is_empty()),
        );

        if let Some(existing) = offers::find_by_dedup_key(ex, &dedup_key).await? {
            if existing.sku_id == sku.id {
                // Same listing seen again: refresh the USD pricing and
                // link the raw row to the already-promoted offer.
                offers::update_usd_prices(ex, existing.id, price_usd, price_usd).await?;
                raw.matched_sku_id = Some(sku.id);
                raw.match_confidence = Some(confidence);
                return finish(ex, raw, RowOutcome::LinkedExistingOffer { via_llm }).await;
            }
            return finish(ex, raw, RowOutcome::DedupConflict).await;
        }

        let price_in_expected_range = match sku.msrp_usd {
            Some(msrp) if msrp > 0. => {
                !trust::price_anomalous(price_usd, msrp * 0.7, msrp * 1.3)
            }
            _ => true,
        };
        let (trust_score, trust_reasons) = trust::score_with_reasons(&trust::TrustFactors {
            merchant_tier: tier,
            has_shipping_info: false,
            has_warranty_info: false,
            has_return_policy: false,
            price_within_expected_range: price_in_expected_range,
            ..Default::default()
        });

        let outcome = RowOutcome::CreatedOffer {
            offer_id: crate::generate_public_id(),
            via_llm,
        };
        let RowOutcome::CreatedOffer { offer_id, .. } = &outcome else {
            unreachable!()
        };
        let country_code = raw.country_code.to_uppercase();
        offers::insert(
            ex,
            &offers::NewOffer {
                offer_id: offer_id.clone(),
                sku_id: sku.id,
                merchant_id: Some(merchant.id),
                dedup_key,
                country: country::display_name(&country_code),
                country_code,
                city: None,
                price: raw.price_local,
                currency: raw.currency.to_uppercase(),
                price_usd,
                final_effective_price: price_usd,
                local_price_formatted: price_display::format_local_price(
                    raw.price_local,
                    &raw.currency,
                ),
                shop_name: raw.merchant_name.clone(),
                trust_score,
                trust_reason_codes_json: Some(serde_json::to_string(&trust_reasons)?),
                availability: "In Stock".to_string(),
                condition: condition.to_string(),
                sim_type: None,
                warranty: None,
                restriction_alert: None,
                product_link: raw.product_link.clone(),
                merchant_url: None,
                detail_token: raw.detail_token.clone(),
                unknown_shipping: true,
                unknown_refund: true,
                source: OFFER_SOURCE.to_string(),
                source_product_id: raw.source_product_id.clone(),
                match_confidence: confidence,
                match_reason_codes_json: Some(reason_codes_json(outcome.reason_code())),
            },
        )
        .await?;

        raw.matched_sku_id = Some(sku.id);
        raw.match_confidence = Some(confidence);
        finish(ex, raw, outcome).await
    }

    /// Resolves the Golden SKU for a row: deterministic key first, then
    /// the budget-bounded LLM candidate fallback. Past LLM attempts are
    /// always reused, never repeated.
    async fn resolve_sku(
        &self,
        ex: &mut PgConnection,
        stats: &mut ReconcileStats,
        raw: &mut RawOffer,
        parsed: &mut ParsedAttrs,
        extracted: &extraction::Extraction,
        condition: Condition,
    ) -> Result<SkuResolution> {
        let Some(model) = extracted.model.as_deref() else {
            return Ok(SkuResolution::MissingAttrs);
        };

        let deterministic = match (&extracted.storage, &extracted.color) {
            (Some(storage), Some(color)) => {
                let sku_key = sku_keys::compose_sku_key(&sku_keys::SkuAttributes {
                    model: model.to_string(),
                    storage: storage.clone(),
                    color: color.clone(),
                    condition: condition.to_string(),
                    ..Default::default()
                });
                match golden_skus::find_by_sku_key(ex, &sku_key).await? {
                    Some(sku) => {
                        return Ok(SkuResolution::Matched {
                            sku,
                            confidence: 1.0,
                            via_llm: false,
                        });
                    }
                    // Catalog miss, e.g. a generic color token where
                    // the catalog uses a specific one. Fall through to
                    // the candidate matcher.
                    None => true,
                }
            }
            _ => false,
        };

        // On the deterministic-miss path candidates can be narrowed by
        // the (known) storage; on the missing-attrs path they cannot.
        let storage_scope = if deterministic {
            extracted.storage.as_deref()
        } else {
            None
        };
        let miss_outcome = || {
            if deterministic {
                SkuResolution::NotInCatalog
            } else {
                SkuResolution::MissingAttrs
            }
        };

        let (attempted, stored_choice, stored_confidence) = parsed.llm_state();
        let chosen = if attempted {
            let chosen = stored_choice.map(str::to_string);
            if chosen.is_some() {
                stats.llm_reused += 1;
            }
            chosen.map(|sku_key| (sku_key, stored_confidence))
        } else if let Some(llm) = &self.llm {
            if stats.llm_external_calls >= stats.llm_budget {
                if stats.llm_budget > 0 {
                    stats.llm_skipped_budget += 1;
                }
                return Ok(miss_outcome());
            }
            let candidates = golden_skus::candidate_sku_keys(
                ex,
                model,
                condition.as_ref(),
                storage_scope,
                CANDIDATE_LIMIT,
            )
            .await?;
            let fingerprint = sku_keys::candidates_fingerprint(&candidates);

            stats.llm_external_calls += 1;
            Metrics::get().llm_calls.inc();
            let choice = matcher::choose_sku_candidate(
                llm,
                &self.store,
                &MatchRequest {
                    title: raw.title_raw.clone(),
                    second_hand_condition: raw.second_hand_condition.clone(),
                    merchant_name: Some(raw.merchant_name.clone()),
                    candidates: candidates.clone(),
                },
            )
            .await;

            // Mark the attempt on every outcome so no later run pays
            // for this title again.
            parsed.mark_llm_attempt(LlmAttempt {
                candidates_count: candidates.len(),
                candidates_fingerprint: fingerprint,
                chosen_sku_key: choice.as_ref().map(|c| c.sku_key.clone()),
                match_confidence: choice.as_ref().map(|c| c.match_confidence),
                payload: choice.as_ref().map(|c| c.raw.clone()),
            });
            raw.parsed_attrs_json = Some(parsed.to_json());

            choice.map(|choice| (choice.sku_key, Some(choice.match_confidence)))
        } else {
            None
        };

        let Some((sku_key, confidence)) = chosen else {
            return Ok(miss_outcome());
        };
        match golden_skus::find_by_sku_key(ex, &sku_key).await? {
            Some(sku) => Ok(SkuResolution::Matched {
                sku,
                confidence: confidence.unwrap_or(0.0).clamp(0.0, 1.0),
                via_llm: true,
            }),
            None => Ok(SkuResolution::NotInCatalog),
        }
    }

    async fn price_usd(&self, raw: &RawOffer, fx_rates: Option<&FxRates>) -> Option<f64> {
        if raw.currency.eq_ignore_ascii_case("USD") {
            return Some((raw.price_local * 100.).round() / 100.);
        }
        let rates = fx_rates?;
        match self
            .fx
            .convert_to_usd(raw.price_local, &raw.currency, Some(rates))
            .await
        {
            Ok(usd) => Some(usd),
            Err(error) => {
                tracing::debug!(currency = %raw.currency, ?error, "fx conversion failed");
                None
            }
        }
    }
}

/// Persists the row's decisions (side-cars, reason codes, linkage) and
/// returns the outcome.
async fn finish(
    ex: &mut PgConnection,
    raw: &mut RawOffer,
    outcome: RowOutcome,
) -> Result<RowOutcome> {
    raw.match_reason_codes_json = Some(reason_codes_json(outcome.reason_code()));
    raw_offers::update_decisions(ex, raw).await?;
    Ok(outcome)
}

fn record_outcome(
    outcome: &RowOutcome,
    raw: &RawOffer,
    stats: &mut ReconcileStats,
    debug: &mut ReconcileDebug,
) {
    debug.push_reason(outcome.reason_code());
    match outcome {
        RowOutcome::MissingTitle | RowOutcome::MissingAttrs => stats.skipped_missing_attrs += 1,
        RowOutcome::SkipMultiVariant => stats.skipped_multi_variant += 1,
        RowOutcome::SkipContract => stats.skipped_contract += 1,
        RowOutcome::SkuNotInCatalog => stats.skipped_no_sku += 1,
        RowOutcome::FxUnavailable => stats.skipped_fx += 1,
        RowOutcome::DedupConflict => stats.dedup_conflict += 1,
        RowOutcome::LinkedExistingOffer { .. } => {
            stats.matched_existing_offer += 1;
            stats.updated_raw_matches += 1;
            debug.push_matched(&raw.raw_offer_id);
        }
        RowOutcome::CreatedOffer { offer_id, .. } => {
            stats.created_offers += 1;
            stats.updated_raw_matches += 1;
            debug.push_created(offer_id);
            debug.push_matched(&raw.raw_offer_id);
        }
    }
}

/// Loads enabled admin phrases and merges them into the defaults.
pub async fn load_pattern_bundle(ex: &mut PgConnection) -> Result<PatternBundle> {
    let rows = pattern_phrases::select_enabled(ex).await?;
    Ok(PatternBundle::merged(rows.into_iter().filter_map(
        |(kind, phrase)| Some((kind.parse::<PhraseKind>().ok()?, phrase)),
    )))
}

#[derive(prometheus_metric_storage::MetricStorage)]
struct Metrics {
    /// Raw rows scanned by reconcile passes.
    rows_scanned: prometheus::IntCounter,
    /// Offers created by reconcile passes.
    offers_created: prometheus::IntCounter,
    /// External LLM matcher calls.
    llm_calls: prometheus::IntCounter,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}
