//! LLM-assisted pattern phrase suggestion.
//!
//! An admin tool, not a detection path: it samples the raw buffer,
//! asks the model for literal phrases in bounded concurrent batches,
//! scores every proposal by actual substring hits against the sample
//! and persists the survivors for review. Nothing here ever touches
//! the active `pattern_phrases` ruleset.

use {
    crate::database::Postgres,
    anyhow::{Context, Result, bail},
    database::pattern_suggestions::{self, NewSuggestion},
    futures::future::join_all,
    kv_store::{Store, prefix, ttl},
    llm_api::{CompletionRequest, LlmClient, extract_first_json_object},
    patterns::{PhraseKind, normalize_phrase},
    serde_json::Value,
    std::{collections::HashMap, sync::Arc, time::Duration},
    tokio::sync::Semaphore,
};

const BATCH_TIMEOUT: Duration = Duration::from_secs(90);
const MERGED_LIMIT_PER_KIND: usize = 30;
const SCORED_LIMIT_PER_KIND: usize = 25;
const EXAMPLE_LIMIT: usize = 3;
const FINGERPRINT_ROWS: usize = 100;

#[derive(Clone, Copy, Debug)]
pub struct SuggestParams {
    pub sample_limit: usize,
    pub llm_batches: usize,
    pub items_per_batch: usize,
    pub force_refresh: bool,
}

impl Default for SuggestParams {
    fn default() -> Self {
        Self {
            sample_limit: 1000,
            llm_batches: 3,
            items_per_batch: 60,
            force_refresh: false,
        }
    }
}

/// One phrase proposal with the confidence the model attached to it.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Proposal {
    pub phrase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// The merged (pre-scoring) LLM output; also the cached payload.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ProposedPhrases {
    #[serde(default)]
    pub contract: Vec<Proposal>,
    #[serde(default)]
    pub condition_new: Vec<Proposal>,
    #[serde(default)]
    pub condition_used: Vec<Proposal>,
    #[serde(default)]
    pub condition_refurbished: Vec<Proposal>,
}

impl ProposedPhrases {
    fn list(&self, kind: PhraseKind) -> &[Proposal] {
        match kind {
            PhraseKind::Contract => &self.contract,
            PhraseKind::ConditionNew => &self.condition_new,
            PhraseKind::ConditionUsed => &self.condition_used,
            PhraseKind::ConditionRefurbished => &self.condition_refurbished,
        }
    }

    fn list_mut(&mut self, kind: PhraseKind) -> &mut Vec<Proposal> {
        match kind {
            PhraseKind::Contract => &mut self.contract,
            PhraseKind::ConditionNew => &mut self.condition_new,
            PhraseKind::ConditionUsed => &mut self.condition_used,
            PhraseKind::ConditionRefurbished => &mut self.condition_refurbished,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct SuggestionExample {
    pub title: String,
    pub link: String,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct SuggestionItem {
    pub phrase: String,
    pub match_count: usize,
    pub llm_confidence: Option<f64>,
    pub examples: Vec<SuggestionExample>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct SuggestedPatterns {
    pub contract: Vec<SuggestionItem>,
    pub condition_new: Vec<SuggestionItem>,
    pub condition_used: Vec<SuggestionItem>,
    pub condition_refurbished: Vec<SuggestionItem>,
}

impl SuggestedPatterns {
    fn set(&mut self, kind: PhraseKind, items: Vec<SuggestionItem>) {
        match kind {
            PhraseKind::Contract => self.contract = items,
            PhraseKind::ConditionNew => self.condition_new = items,
            PhraseKind::ConditionUsed => self.condition_used = items,
            PhraseKind::ConditionRefurbished => self.condition_refurbished = items,
        }
    }

    fn all(&self) -> impl Iterator<Item = (PhraseKind, &[SuggestionItem])> {
        [
            (PhraseKind::Contract, self.contract.as_slice()),
            (PhraseKind::ConditionNew, self.condition_new.as_slice()),
            (PhraseKind::ConditionUsed, self.condition_used.as_slice()),
            (
                PhraseKind::ConditionRefurbished,
                self.condition_refurbished.as_slice(),
            ),
        ]
        .into_iter()
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct SuggestResult {
    pub cached: bool,
    pub llm_calls: usize,
    pub sample_size: usize,
    pub run_id: String,
    pub suggestions: SuggestedPatterns,
}

pub struct Suggester {
    llm: LlmClient,
    store: Store,
    max_concurrency: usize,
}

impl Suggester {
    pub fn new(llm: LlmClient, store: Store, max_concurrency: usize) -> Self {
        Self {
            llm,
            store,
            max_concurrency: max_concurrency.clamp(1, 8),
        }
    }

    /// Runs one suggest pass. Fails only when nothing at all could be
    /// computed (lock held elsewhere, or every batch failed).
    pub async fn suggest_patterns(
        &self,
        db: &Postgres,
        params: SuggestParams,
    ) -> Result<SuggestResult> {
        let sample_limit = params.sample_limit.clamp(50, 2000);
        let llm_batches = params.llm_batches.clamp(1, 4);
        let items_per_batch = params.items_per_batch.clamp(20, 80);

        let mut ex = db.0.acquire().await?;
        let rows = database::raw_offers::sample_recent(&mut ex, sample_limit as i64).await?;
        drop(ex);
        let sample_size = rows.len();
        if sample_size == 0 {
            return Ok(SuggestResult::default());
        }

        let cache_key = sample_cache_key(&rows);
        if !params.force_refresh
            && let Some(result) = self.finish_from_cache(db, &cache_key, &rows).await?
        {
            return Ok(result);
        }

        let lock_key = format!("{}{}", prefix::SUGGEST, sku_keys::hash_parts(&[&cache_key]));
        if !self
            .store
            .acquire_lock(&lock_key, ttl::SUGGEST_LOCK)
            .await
            .context("acquire suggest lock")?
        {
            bail!("a pattern-suggest run is already in progress");
        }
        let result = self
            .suggest_locked(db, &cache_key, &rows, llm_batches, items_per_batch)
            .await;
        if let Err(error) = self.store.release_lock(&lock_key).await {
            tracing::warn!(?error, "failed to release suggest lock");
        }
        result
    }

    async fn suggest_locked(
        &self,
        db: &Postgres,
        cache_key: &str,
        rows: &[(String, String)],
        llm_batches: usize,
        items_per_batch: usize,
    ) -> Result<SuggestResult> {
        // Someone may have finished while we waited for the lock.
        if let Some(result) = self.finish_from_cache(db, cache_key, rows).await? {
            return Ok(result);
        }

        let batches = build_batches(rows, llm_batches, items_per_batch);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let calls = batches.len();
        let outcomes = join_all(batches.into_iter().map(|batch| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                self.call_batch(&batch).await
            }
        }))
        .await;

        let mut merged = ProposedPhrases::default();
        let mut succeeded = 0usize;
        for outcome in outcomes {
            match outcome {
                Ok(parsed) => {
                    succeeded += 1;
                    for kind in PhraseKind::ALL {
                        merged.list_mut(kind).extend(parsed.list(kind).iter().cloned());
                    }
                }
                Err(error) => tracing::warn!(?error, "suggest batch failed"),
            }
        }
        if succeeded == 0 {
            bail!("all {calls} pattern-suggest batches failed");
        }

        let merged = dedup_proposals(&merged);
        if let Err(error) = self
            .store
            .set_json(cache_key, &merged, ttl::SUGGEST_CACHE)
            .await
        {
            tracing::warn!(?error, "failed to cache suggest payload");
        }

        let mut result = score_and_build(&merged, rows);
        result.cached = false;
        result.llm_calls = calls;
        persist_suggestions(db, &result).await?;
        Ok(result)
    }

    async fn finish_from_cache(
        &self,
        db: &Postgres,
        cache_key: &str,
        rows: &[(String, String)],
    ) -> Result<Option<SuggestResult>> {
        let Some(cached) = self.store.get_json::<ProposedPhrases>(cache_key).await? else {
            return Ok(None);
        };
        let mut result = score_and_build(&cached, rows);
        result.cached = true;
        persist_suggestions(db, &result).await?;
        Ok(Some(result))
    }

    async fn call_batch(&self, items: &[(String, String)]) -> Result<ProposedPhrases> {
        let content = self
            .llm
            .complete(&CompletionRequest {
                system: None,
                user: batch_prompt(items),
                temperature: 0.0,
                max_completion_tokens: None,
                json_response: true,
                timeout: Some(BATCH_TIMEOUT),
            })
            .await
            .context("suggest batch completion")?;
        let payload =
            extract_first_json_object(&content).context("suggest batch returned no JSON object")?;
        parse_proposals(&payload).context("suggest batch JSON did not validate")
    }
}

/// Cache key over a small fingerprint of the sample so an unchanged
/// buffer reuses yesterday's proposals.
fn sample_cache_key(rows: &[(String, String)]) -> String {
    let mut parts: Vec<String> = vec![rows.len().to_string()];
    for (title, link) in rows.iter().take(FINGERPRINT_ROWS) {
        parts.push(truncate_chars(title, 80));
        parts.push(truncate_chars(link, 80));
    }
    let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
    format!("{}{}", prefix::SUGGEST, sku_keys::hash_parts(&refs))
}

/// Evenly-spaced batches over the sample so each call sees a different
/// slice of the buffer, not just the newest rows.
fn build_batches(
    rows: &[(String, String)],
    llm_batches: usize,
    items_per_batch: usize,
) -> Vec<Vec<(String, String)>> {
    let sample_size = rows.len();
    let mut batches = Vec::new();
    for i in 0..llm_batches {
        let start = i * sample_size / llm_batches;
        let end = (start + items_per_batch).min(sample_size);
        let chunk: Vec<(String, String)> = rows[start..end]
            .iter()
            .filter(|(title, _)| !title.trim().is_empty())
            .map(|(title, link)| {
                (
                    truncate_chars(title, 160),
                    truncate_chars(&patterns::link_hint(Some(link)), 200),
                )
            })
            .collect();
        if !chunk.is_empty() {
            batches.push(chunk);
        }
    }
    batches
}

fn batch_prompt(items: &[(String, String)]) -> String {
    let mut prompt = String::from(
        "You analyze iPhone shopping listings.\n\
         Task: propose literal phrases (not regex) that help detect:\n\
         - contract/plan listings (subscription/installments)\n\
         - condition hints: new vs used vs refurbished\n\n\
         You MUST use only phrases that appear in the provided inputs (title or link_hint).\n\
         Return ONLY valid JSON with exactly these keys:\n\
         { \"contract\": [{\"phrase\": string, \"confidence\": number}], \
         \"condition_new\": [...], \"condition_used\": [...], \"condition_refurbished\": [...] }\n\
         Rules:\n\
         - lowercase phrases\n\
         - phrases are 2..80 chars\n\
         - confidence is 0..1\n\
         - no regex syntax, no wildcards\n\
         - prefer multi-word phrases when possible\n\n\
         inputs:\n",
    );
    for (title, link_hint) in items {
        prompt.push_str(&format!("- title: {title}\n  link_hint: {link_hint}\n"));
    }
    prompt
}

/// Accepts both `{"phrase": ..., "confidence": ...}` objects and bare
/// strings per kind; anything else fails the batch.
fn parse_proposals(payload: &Value) -> Result<ProposedPhrases> {
    let mut out = ProposedPhrases::default();
    for kind in PhraseKind::ALL {
        let Some(list) = payload.get(kind.as_ref()) else {
            continue;
        };
        let list = list
            .as_array()
            .with_context(|| format!("{kind} is not an array"))?;
        for entry in list {
            let proposal = match entry {
                Value::String(phrase) => Proposal {
                    phrase: phrase.clone(),
                    confidence: None,
                },
                Value::Object(_) => Proposal {
                    phrase: entry
                        .get("phrase")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    confidence: entry.get("confidence").and_then(Value::as_f64),
                },
                _ => continue,
            };
            if !proposal.phrase.is_empty() {
                out.list_mut(kind).push(proposal);
            }
        }
    }
    Ok(out)
}

/// Normalizes and dedupes per kind, keeping the best confidence per
/// phrase and at most 30 entries.
fn dedup_proposals(merged: &ProposedPhrases) -> ProposedPhrases {
    let mut out = ProposedPhrases::default();
    for kind in PhraseKind::ALL {
        let mut seen: HashMap<String, usize> = HashMap::new();
        let deduped = out.list_mut(kind);
        for proposal in merged.list(kind) {
            let phrase = normalize_phrase(&proposal.phrase);
            let length = phrase.chars().count();
            if !(2..=80).contains(&length) {
                continue;
            }
            if let Some(&index) = seen.get(&phrase) {
                let existing: &mut Proposal = &mut deduped[index];
                existing.confidence = match (existing.confidence, proposal.confidence) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
                continue;
            }
            if deduped.len() >= MERGED_LIMIT_PER_KIND {
                continue;
            }
            seen.insert(phrase.clone(), deduped.len());
            deduped.push(Proposal {
                phrase,
                confidence: proposal.confidence,
            });
        }
    }
    out
}

/// Scores every proposal by literal substring hits against the sample
/// (title or link), drops zero-hit phrases and keeps the top 25 per
/// kind with up to three examples each.
fn score_and_build(proposals: &ProposedPhrases, rows: &[(String, String)]) -> SuggestResult {
    let haystacks: Vec<(String, String)> = rows
        .iter()
        .map(|(title, link)| (title.to_lowercase(), link.to_lowercase()))
        .collect();

    let mut suggestions = SuggestedPatterns::default();
    for kind in PhraseKind::ALL {
        let mut items: Vec<SuggestionItem> = Vec::new();
        for proposal in proposals.list(kind) {
            let phrase = normalize_phrase(&proposal.phrase);
            if phrase.is_empty() {
                continue;
            }
            let mut match_count = 0;
            let mut examples = Vec::new();
            for (title, link) in &haystacks {
                if title.contains(&phrase) || link.contains(&phrase) {
                    match_count += 1;
                    if examples.len() < EXAMPLE_LIMIT {
                        examples.push(SuggestionExample {
                            title: truncate_chars(title, 180),
                            link: truncate_chars(link, 220),
                        });
                    }
                }
            }
            if match_count > 0 {
                items.push(SuggestionItem {
                    phrase,
                    match_count,
                    llm_confidence: proposal.confidence,
                    examples,
                });
            }
        }
        items.sort_by(|a, b| b.match_count.cmp(&a.match_count));
        items.truncate(SCORED_LIMIT_PER_KIND);
        suggestions.set(kind, items);
    }

    SuggestResult {
        cached: false,
        llm_calls: 0,
        sample_size: rows.len(),
        run_id: crate::generate_public_id(),
        suggestions,
    }
}

async fn persist_suggestions(db: &Postgres, result: &SuggestResult) -> Result<()> {
    let mut tx = db.0.begin().await.context("begin suggestions transaction")?;
    for (kind, items) in result.suggestions.all() {
        for item in items {
            pattern_suggestions::upsert(
                &mut tx,
                &NewSuggestion {
                    kind: kind.to_string(),
                    phrase: item.phrase.clone(),
                    match_count: i32::try_from(item.match_count).unwrap_or(i32::MAX),
                    llm_confidence: item.llm_confidence,
                    sample_size: i32::try_from(result.sample_size).unwrap_or(i32::MAX),
                    examples_json: Some(serde_json::to_string(&item.examples)?),
                    run_id: result.run_id.clone(),
                },
            )
            .await?;
        }
    }
    tx.commit().await.context("commit suggestions")?;
    Ok(())
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn sample() -> Vec<(String, String)> {
        vec![
            (
                "iPhone 16 Pro mit Vertrag 24 Monate".to_string(),
                "https://shop.de/tarife?bundle=vertrag".to_string(),
            ),
            (
                "iPhone 15 Pro gebraucht - sehr gut".to_string(),
                "https://shop.de/gebraucht/iphone-15".to_string(),
            ),
            (
                "iPhone 16 128GB Brand New".to_string(),
                "https://shop.example/p/1".to_string(),
            ),
        ]
    }

    #[test]
    fn batches_are_evenly_spaced_and_bounded() {
        let rows: Vec<(String, String)> = (0..100)
            .map(|i| (format!("title {i}"), format!("https://x/{i}")))
            .collect();
        let batches = build_batches(&rows, 4, 20);
        assert_eq!(batches.len(), 4);
        assert!(batches.iter().all(|batch| batch.len() == 20));
        // Batches start at 0, 25, 50 and 75.
        assert_eq!(batches[1][0].0, "title 25");
        assert_eq!(batches[3][0].0, "title 75");
    }

    #[test]
    fn parses_object_and_string_proposals() {
        let payload = json!({
            "contract": [
                {"phrase": "Mit Vertrag", "confidence": 0.9},
                "ratenzahlung",
            ],
            "condition_used": [{"phrase": "gebraucht", "confidence": 0.7}],
        });
        let parsed = parse_proposals(&payload).unwrap();
        assert_eq!(parsed.contract.len(), 2);
        assert_eq!(parsed.contract[0].confidence, Some(0.9));
        assert_eq!(parsed.contract[1].phrase, "ratenzahlung");
        assert_eq!(parsed.condition_used[0].phrase, "gebraucht");
    }

    #[test]
    fn dedup_keeps_best_confidence_and_normalizes() {
        let merged = ProposedPhrases {
            contract: vec![
                Proposal {
                    phrase: "  Mit  Vertrag ".to_string(),
                    confidence: Some(0.5),
                },
                Proposal {
                    phrase: "mit vertrag".to_string(),
                    confidence: Some(0.9),
                },
                Proposal {
                    phrase: "x".to_string(), // too short
                    confidence: None,
                },
            ],
            ..Default::default()
        };
        let deduped = dedup_proposals(&merged);
        assert_eq!(deduped.contract.len(), 1);
        assert_eq!(deduped.contract[0].phrase, "mit vertrag");
        assert_eq!(deduped.contract[0].confidence, Some(0.9));
    }

    #[test]
    fn scoring_counts_hits_and_drops_misses() {
        let proposals = ProposedPhrases {
            contract: vec![Proposal {
                phrase: "mit vertrag".to_string(),
                confidence: Some(0.9),
            }],
            condition_used: vec![
                Proposal {
                    phrase: "gebraucht".to_string(),
                    confidence: Some(0.7),
                },
                Proposal {
                    phrase: "zero hits phrase".to_string(),
                    confidence: Some(0.99),
                },
            ],
            ..Default::default()
        };
        let result = score_and_build(&proposals, &sample());
        assert_eq!(result.sample_size, 3);

        // The title match and the URL-hint match both count.
        assert_eq!(result.suggestions.contract[0].phrase, "mit vertrag");
        assert_eq!(result.suggestions.contract[0].match_count, 1);
        assert_eq!(result.suggestions.condition_used[0].phrase, "gebraucht");
        assert_eq!(result.suggestions.condition_used[0].match_count, 1);

        // Zero-hit phrases do not survive scoring.
        assert_eq!(result.suggestions.condition_used.len(), 1);
        assert!(result.suggestions.condition_new.is_empty());

        // Every surviving phrase is lowercase, bounded and exampled.
        for (_, items) in result.suggestions.all() {
            for item in items {
                assert_eq!(item.phrase, item.phrase.to_lowercase());
                let length = item.phrase.chars().count();
                assert!((2..=80).contains(&length));
                assert!(item.match_count >= 1);
                assert!(!item.examples.is_empty());
            }
        }
    }

    #[test]
    fn cache_key_tracks_the_sample() {
        let a = sample_cache_key(&sample());
        let b = sample_cache_key(&sample());
        assert_eq!(a, b);
        assert!(a.starts_with(prefix::SUGGEST));

        let mut changed = sample();
        changed[0].0 = "different title".to_string();
        assert_ne!(a, sample_cache_key(&changed));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("深藍色の良いもの", 2), "深藍");
        assert_eq!(truncate_chars("short", 80), "short");
    }
}
