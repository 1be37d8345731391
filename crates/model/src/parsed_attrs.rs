//! Typed view of the `parsed_attrs_json` side-car stored on every raw
//! offer.
//!
//! The snapshot is written by the reconciler and read back on later
//! runs, most importantly to avoid re-calling the LLM for a row that
//! was already attempted. Fields unknown to this version are preserved
//! through the `extra` map so decisions recorded by newer code are
//! never dropped on rewrite.

use serde_json::{Map, Value};

/// Deterministic extractor output captured at reconcile time.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ExtractionSnapshot {
    pub attributes: ExtractedAttributes,
    pub confidence: String,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ExtractedAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// One recorded LLM candidate-set attempt.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LlmAttempt {
    pub candidates_count: usize,
    pub candidates_fingerprint: Option<String>,
    pub chosen_sku_key: Option<String>,
    pub match_confidence: Option<f64>,
    pub payload: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ParsedAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ExtractionSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_hand_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_condition: Option<String>,
    /// True once an LLM candidate-set call was made for this row,
    /// regardless of whether it chose anything.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub llm_attempted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_candidates_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_candidates_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_chosen_sku_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_match_confidence: Option<f64>,
    /// Raw LLM payload as returned by the matcher, kept for debugging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<Value>,
    /// Fields written by other (newer) versions of the pipeline.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ParsedAttrs {
    /// Lenient parse of the stored side-car. Missing or malformed JSON
    /// yields an empty snapshot; a raw row must never fail reconcile
    /// because of a bad side-car.
    pub fn from_json(stored: Option<&str>) -> Self {
        stored
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("parsed attrs serialize")
    }

    /// Records the deterministic extraction, keeping any LLM fields that
    /// a previous run already wrote.
    pub fn record_extraction(
        &mut self,
        extraction: ExtractionSnapshot,
        second_hand_condition: Option<&str>,
        normalized_condition: &str,
    ) {
        self.extraction = Some(extraction);
        self.second_hand_condition = second_hand_condition.map(str::to_string);
        self.normalized_condition = Some(normalized_condition.to_string());
    }

    /// Marks an LLM attempt. Called on every outcome, including "chose
    /// nothing", so later runs reuse the stored decision instead of
    /// calling again.
    pub fn mark_llm_attempt(&mut self, attempt: LlmAttempt) {
        self.llm_attempted = true;
        self.llm_candidates_count = Some(attempt.candidates_count);
        self.llm_candidates_fingerprint = attempt.candidates_fingerprint;
        self.llm_chosen_sku_key = attempt.chosen_sku_key;
        self.llm_match_confidence = attempt.match_confidence;
        if attempt.payload.is_some() {
            self.llm = attempt.payload;
        }
    }

    /// `(attempted, chosen_sku_key, match_confidence)` of the stored
    /// attempt, if any.
    pub fn llm_state(&self) -> (bool, Option<&str>, Option<f64>) {
        let chosen = self
            .llm_chosen_sku_key
            .as_deref()
            .filter(|key| !key.trim().is_empty());
        (self.llm_attempted, chosen, self.llm_match_confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_json_yields_default() {
        assert_eq!(ParsedAttrs::from_json(None), ParsedAttrs::default());
        assert_eq!(ParsedAttrs::from_json(Some("{oops")), ParsedAttrs::default());
        assert_eq!(ParsedAttrs::from_json(Some("[1, 2]")), ParsedAttrs::default());
    }

    #[test]
    fn recording_extraction_keeps_llm_fields() {
        let stored = r#"{"llm_attempted":true,"llm_chosen_sku_key":"iphone-16-pro-256gb-black-new","llm_match_confidence":0.8}"#;
        let mut attrs = ParsedAttrs::from_json(Some(stored));
        attrs.record_extraction(
            ExtractionSnapshot {
                attributes: ExtractedAttributes {
                    model: Some("iphone-16-pro".to_string()),
                    ..Default::default()
                },
                confidence: "medium".to_string(),
            },
            None,
            "new",
        );
        let (attempted, chosen, confidence) = attrs.llm_state();
        assert!(attempted);
        assert_eq!(chosen, Some("iphone-16-pro-256gb-black-new"));
        assert_eq!(confidence, Some(0.8));
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let stored = r#"{"normalized_condition":"new","experimental_flag":42}"#;
        let attrs = ParsedAttrs::from_json(Some(stored));
        let rewritten = attrs.to_json();
        assert!(rewritten.contains("\"experimental_flag\":42"));
    }

    #[test]
    fn attempt_with_no_choice_still_counts_as_attempted() {
        let mut attrs = ParsedAttrs::default();
        attrs.mark_llm_attempt(LlmAttempt {
            candidates_count: 12,
            candidates_fingerprint: Some("abc".to_string()),
            ..Default::default()
        });
        let (attempted, chosen, _) = attrs.llm_state();
        assert!(attempted);
        assert_eq!(chosen, None);
    }

    #[test]
    fn whitespace_only_choice_reads_as_none() {
        let attrs = ParsedAttrs::from_json(Some(
            r#"{"llm_attempted":true,"llm_chosen_sku_key":"  "}"#,
        ));
        assert_eq!(attrs.llm_state(), (true, None, None));
    }
}
