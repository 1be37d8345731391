//! Deterministic attribute extraction from free-text product titles.
//!
//! The extractor walks ordered regex tables from most to least specific
//! and takes the first match. Ordering is load-bearing: `pro max` must
//! be tested before `pro`, `deep blue` before `blue`, year-suffixed SE
//! strings before the generic SE. The tables cover the languages the
//! ingestion currently sees (EN/DE/FR/JA/KO/ZH/AR).
//!
//! The extractor never fails: a title it cannot place simply comes back
//! with low confidence and no model.

mod color;
mod condition;
mod noise;
mod phone_model;
mod storage;

pub use {
    color::extract_color,
    condition::extract_condition,
    noise::{is_noise, mentions_iphone},
    phone_model::extract_model,
    storage::{extract_storage, storage_tokens},
};

use {model::Condition, strum::Display};

/// How certain the extractor is about its output.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Confidence {
    /// Model, storage and color all found.
    High,
    /// Model found, storage or color missing.
    Medium,
    /// No model; the title is not usable deterministically.
    Low,
}

/// Result of extracting SKU attributes from one title.
#[derive(Clone, Debug, PartialEq)]
pub struct Extraction {
    pub model: Option<String>,
    pub storage: Option<String>,
    pub color: Option<String>,
    pub condition: Condition,
    pub confidence: Confidence,
    pub raw_title: String,
}

/// Extracts `(model, storage, color, condition)` from a product title.
pub fn extract_attributes(title: &str) -> Extraction {
    let model = extract_model(title);
    let storage = extract_storage(title);
    let color = extract_color(title);
    let condition = extract_condition(title);

    let confidence = match (&model, &storage, &color) {
        (None, ..) => Confidence::Low,
        (Some(_), Some(_), Some(_)) => Confidence::High,
        _ => Confidence::Medium,
    };

    Extraction {
        model: model.map(str::to_string),
        storage,
        color: color.map(str::to_string),
        condition,
        confidence,
        raw_title: title.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_confidence_when_everything_parses() {
        let result = extract_attributes("Apple iPhone 16 Pro Max 256GB Black Titanium New");
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.model.as_deref(), Some("iphone-16-pro-max"));
        assert_eq!(result.storage.as_deref(), Some("256gb"));
        assert_eq!(result.color.as_deref(), Some("black"));
        assert_eq!(result.condition, Condition::New);
    }

    #[test]
    fn medium_confidence_when_color_is_missing() {
        let result = extract_attributes("Apple iPhone 16 Pro 512GB Sealed");
        assert_eq!(result.confidence, Confidence::Medium);
        assert_eq!(result.model.as_deref(), Some("iphone-16-pro"));
        assert_eq!(result.storage.as_deref(), Some("512gb"));
        assert_eq!(result.color, None);
    }

    #[test]
    fn medium_confidence_when_storage_is_missing() {
        let result = extract_attributes("Apple iPhone 16 Pro Black");
        assert_eq!(result.confidence, Confidence::Medium);
        assert_eq!(result.model.as_deref(), Some("iphone-16-pro"));
        assert_eq!(result.color.as_deref(), Some("black"));
    }

    #[test]
    fn low_confidence_without_model() {
        let result = extract_attributes("256GB Black Phone Case");
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.model, None);
    }

    #[test]
    fn preserves_the_raw_title() {
        let title = "Apple iPhone 16 Pro Max 256GB Desert Titanium";
        assert_eq!(extract_attributes(title).raw_title, title);
    }

    #[test]
    fn multilingual_title_parses_deterministically() {
        let result = extract_attributes("iPhone 17 Pro 深藍 256GB");
        assert_eq!(result.model.as_deref(), Some("iphone-17-pro"));
        assert_eq!(result.storage.as_deref(), Some("256gb"));
        assert_eq!(result.color.as_deref(), Some("deep-blue"));
        assert_eq!(result.confidence, Confidence::High);
    }
}
