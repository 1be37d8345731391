//! Candidate-set SKU matching.
//!
//! The model is only ever allowed to pick one of the `sku_key`s the
//! caller enumerates; an answer outside the candidate list is dropped.
//! Results are cached for a long time (titles repeat heavily across
//! runs) and calls are single-flighted through the KV lock so parallel
//! workers do not pay twice for the same title.

use {
    crate::{CompletionRequest, LlmClient, extract_first_json_object},
    kv_store::{Store, prefix, ttl},
    serde_json::Value,
};

/// A validated choice from the candidate list.
#[derive(Clone, Debug, PartialEq)]
pub struct ChosenSku {
    pub sku_key: String,
    pub match_confidence: f64,
    /// The raw payload, persisted into the raw offer's side-car.
    pub raw: Value,
}

/// One matching request.
#[derive(Clone, Debug, Default)]
pub struct MatchRequest {
    pub title: String,
    pub second_hand_condition: Option<String>,
    pub merchant_name: Option<String>,
    /// Already scoped by `(model, condition[, storage])` by the caller.
    pub candidates: Vec<String>,
}

#[derive(serde::Deserialize)]
struct ParseResponse {
    #[serde(default)]
    #[allow(dead_code)]
    is_accessory: bool,
    #[serde(default)]
    #[allow(dead_code)]
    is_bundle: bool,
    #[serde(default)]
    #[allow(dead_code)]
    is_contract: bool,
    r#match: ParsedMatch,
}

#[derive(serde::Deserialize)]
struct ParsedMatch {
    sku_key: String,
    match_confidence: f64,
    #[serde(default)]
    #[allow(dead_code)]
    reason: Option<String>,
}

/// Asks the model to choose the best `sku_key` from the candidates.
///
/// Returns `None` on every kind of failure: cache-only deferral (lock
/// held elsewhere), HTTP errors, malformed output, out-of-candidates
/// answers. The caller records the attempt either way and never calls
/// again for the same row.
pub async fn choose_sku_candidate(
    client: &LlmClient,
    store: &Store,
    request: &MatchRequest,
) -> Option<ChosenSku> {
    if request.title.trim().is_empty() {
        return None;
    }
    let candidates = deduped(&request.candidates);
    if candidates.is_empty() {
        return None;
    }

    let condition = request.second_hand_condition.as_deref().unwrap_or("").trim();
    let merchant = request.merchant_name.as_deref().unwrap_or("").trim();
    let fingerprint = sku_keys::candidates_fingerprint(&candidates).unwrap_or_default();
    let cache_key = format!(
        "{}{}",
        prefix::LLM_PARSE,
        sku_keys::hash_parts(&[&request.title, condition, merchant, &fingerprint])
    );

    if let Some(choice) = validated_cache_entry(store, &cache_key, &candidates).await {
        return Some(choice);
    }

    let lock_key = format!("{}{}", prefix::LLM_PARSE, sku_keys::hash_parts(&[&cache_key]));
    match store.acquire_lock(&lock_key, ttl::LLM_PARSE_LOCK).await {
        Ok(true) => {}
        Ok(false) => {
            // Another worker is computing this title; rely on its
            // cached result next run.
            tracing::debug!("sku matcher lock held elsewhere, deferring");
            return None;
        }
        Err(error) => {
            tracing::warn!(?error, "sku matcher lock acquisition failed");
            return None;
        }
    }

    let result = call_and_cache(client, store, request, &candidates, condition, merchant, &cache_key)
        .await;
    if let Err(error) = store.release_lock(&lock_key).await {
        tracing::warn!(?error, "failed to release sku matcher lock");
    }
    result
}

async fn call_and_cache(
    client: &LlmClient,
    store: &Store,
    request: &MatchRequest,
    candidates: &[String],
    condition: &str,
    merchant: &str,
    cache_key: &str,
) -> Option<ChosenSku> {
    // Someone else may have finished between our cache miss and the
    // lock acquisition.
    if let Some(choice) = validated_cache_entry(store, cache_key, candidates).await {
        return Some(choice);
    }

    let completion = CompletionRequest {
        system: Some(system_prompt().to_string()),
        user: user_prompt(&request.title, condition, merchant, candidates),
        temperature: 0.0,
        max_completion_tokens: Some(500),
        json_response: false,
        timeout: None,
    };
    let content = match client.complete(&completion).await {
        Ok(content) => content,
        Err(error) => {
            tracing::warn!(?error, "sku matcher llm call failed");
            return None;
        }
    };

    let payload = extract_first_json_object(&content).unwrap_or(Value::Object(Default::default()));
    // Persist the raw payload even when it fails validation below: it
    // documents the attempt and prevents a re-call next run.
    if let Err(error) = store
        .set(cache_key, &payload.to_string(), ttl::LLM_PARSE)
        .await
    {
        tracing::warn!(?error, "failed to cache sku matcher payload");
    }

    let choice = validate_choice(&payload, candidates);
    if choice.is_none() {
        tracing::warn!("sku matcher output invalid or out of candidates");
    }
    choice
}

async fn validated_cache_entry(
    store: &Store,
    cache_key: &str,
    candidates: &[String],
) -> Option<ChosenSku> {
    let cached = store.get(cache_key).await.ok()??;
    let payload = extract_first_json_object(&cached)?;
    validate_choice(&payload, candidates)
}

/// Accepts the payload only when it parses into the expected shape,
/// the confidence is within `[0, 1]` and the chosen key is one of the
/// current candidates.
fn validate_choice(payload: &Value, candidates: &[String]) -> Option<ChosenSku> {
    let parsed: ParseResponse = serde_json::from_value(payload.clone()).ok()?;
    if !(0.0..=1.0).contains(&parsed.r#match.match_confidence) {
        return None;
    }
    if !candidates.contains(&parsed.r#match.sku_key) {
        return None;
    }
    Some(ChosenSku {
        sku_key: parsed.r#match.sku_key,
        match_confidence: parsed.r#match.match_confidence,
        raw: payload.clone(),
    })
}

fn deduped(candidates: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let candidate = candidate.trim();
        if !candidate.is_empty() && !out.iter().any(|existing| existing == candidate) {
            out.push(candidate.to_string());
        }
    }
    out
}

fn system_prompt() -> &'static str {
    "You are a product-title parser for iPhone SKUs.\n\
     Choose the single best sku_key from the provided candidates.\n\
     Return ONLY valid JSON matching this shape:\n\
     { \"is_accessory\": bool, \"is_bundle\": bool, \"is_contract\": bool, \
     \"match\": { \"sku_key\": string, \"match_confidence\": number, \"reason\": string|null } }\n\
     Rules:\n\
     - sku_key MUST be exactly one of the candidates\n\
     - match_confidence is 0..1\n\
     - Do not include any extra keys"
}

fn user_prompt(title: &str, condition: &str, merchant: &str, candidates: &[String]) -> String {
    let mut prompt = format!(
        "title: {title}\nsecond_hand_condition: {condition}\nmerchant: {merchant}\ncandidates:\n"
    );
    for candidate in candidates {
        prompt.push_str("- ");
        prompt.push_str(candidate);
        prompt.push('\n');
    }
    prompt
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn candidates() -> Vec<String> {
        vec![
            "iphone-17-pro-256gb-deep-blue-new".to_string(),
            "iphone-17-pro-256gb-silver-new".to_string(),
        ]
    }

    #[test]
    fn accepts_a_choice_from_the_candidate_list() {
        let payload = json!({
            "is_accessory": false,
            "is_bundle": false,
            "is_contract": false,
            "match": {
                "sku_key": "iphone-17-pro-256gb-deep-blue-new",
                "match_confidence": 0.8,
                "reason": "title mentions deep blue",
            },
        });
        let choice = validate_choice(&payload, &candidates()).unwrap();
        assert_eq!(choice.sku_key, "iphone-17-pro-256gb-deep-blue-new");
        assert_eq!(choice.match_confidence, 0.8);
        assert_eq!(choice.raw, payload);
    }

    #[test]
    fn rejects_invented_sku_keys() {
        let payload = json!({
            "match": {"sku_key": "iphone-17-pro-256gb-gold-new", "match_confidence": 0.9},
        });
        assert_eq!(validate_choice(&payload, &candidates()), None);
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let payload = json!({
            "match": {"sku_key": "iphone-17-pro-256gb-silver-new", "match_confidence": 1.7},
        });
        assert_eq!(validate_choice(&payload, &candidates()), None);
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert_eq!(validate_choice(&json!({}), &candidates()), None);
        assert_eq!(
            validate_choice(&json!({"match": {"sku_key": 42}}), &candidates()),
            None
        );
    }

    #[test]
    fn candidate_dedup_preserves_order() {
        let deduped = deduped(&[
            " a ".to_string(),
            "b".to_string(),
            "a".to_string(),
            "".to_string(),
        ]);
        assert_eq!(deduped, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn prompt_enumerates_candidates() {
        let prompt = user_prompt("iPhone 17 Pro 256GB", "", "Apple", &candidates());
        assert!(prompt.contains("- iphone-17-pro-256gb-deep-blue-new\n"));
        assert!(prompt.contains("- iphone-17-pro-256gb-silver-new\n"));
    }
}
