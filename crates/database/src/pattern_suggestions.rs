//! LLM-proposed phrases with their observed match analytics. Not used
//! for detection directly; admins promote winners into
//! `pattern_phrases`.

use sqlx::{
    PgConnection,
    types::chrono::{DateTime, Utc},
};

/// One row in the `pattern_suggestions` table.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct PatternSuggestion {
    pub id: i64,
    pub kind: String,
    pub phrase: String,
    pub match_count_last: i32,
    pub match_count_max: i32,
    pub llm_confidence_last: Option<f64>,
    pub llm_confidence_max: Option<f64>,
    pub sample_size_last: i32,
    pub examples_json: Option<String>,
    pub last_run_id: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// A scored suggestion from one suggest run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewSuggestion {
    pub kind: String,
    pub phrase: String,
    pub match_count: i32,
    pub llm_confidence: Option<f64>,
    pub sample_size: i32,
    pub examples_json: Option<String>,
    pub run_id: String,
}

/// Upserts one run's observation. The `*_last` columns always reflect
/// the latest run while the `*_max` columns only move upwards.
pub async fn upsert(ex: &mut PgConnection, suggestion: &NewSuggestion) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO pattern_suggestions (
    kind,
    phrase,
    match_count_last,
    match_count_max,
    llm_confidence_last,
    llm_confidence_max,
    sample_size_last,
    examples_json,
    last_run_id,
    first_seen_at,
    last_seen_at
)
VALUES ($1, $2, $3, $3, $4, $4, $5, $6, $7, now(), now())
ON CONFLICT (kind, phrase) DO UPDATE
SET match_count_last = excluded.match_count_last,
    match_count_max = GREATEST(pattern_suggestions.match_count_max, excluded.match_count_last),
    llm_confidence_last = excluded.llm_confidence_last,
    llm_confidence_max = GREATEST(
        COALESCE(pattern_suggestions.llm_confidence_max, 0),
        COALESCE(excluded.llm_confidence_last, 0)
    ),
    sample_size_last = excluded.sample_size_last,
    examples_json = excluded.examples_json,
    last_run_id = excluded.last_run_id,
    last_seen_at = now()
    "#;
    sqlx::query(QUERY)
        .bind(&suggestion.kind)
        .bind(&suggestion.phrase)
        .bind(suggestion.match_count)
        .bind(suggestion.llm_confidence)
        .bind(suggestion.sample_size)
        .bind(&suggestion.examples_json)
        .bind(&suggestion.run_id)
        .execute(ex)
        .await
        .map(|_| ())
}

pub async fn find(
    ex: &mut PgConnection,
    kind: &str,
    phrase: &str,
) -> Result<Option<PatternSuggestion>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT *
FROM pattern_suggestions
WHERE kind = $1 AND phrase = $2
    "#;
    sqlx::query_as(QUERY)
        .bind(kind)
        .bind(phrase)
        .fetch_optional(ex)
        .await
}
