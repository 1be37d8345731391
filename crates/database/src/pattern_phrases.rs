//! Admin-managed literal phrases extending the compiled-in detection
//! defaults without a deploy.

use sqlx::{
    PgConnection,
    types::chrono::{DateTime, Utc},
};

/// One row in the `pattern_phrases` table.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct PatternPhrase {
    pub id: i64,
    pub kind: String,
    pub phrase: String,
    pub enabled: bool,
    pub source: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Enabled phrases in insertion order; the merge into the default
/// bundle preserves this order.
pub async fn select_enabled(ex: &mut PgConnection) -> Result<Vec<(String, String)>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT kind, phrase
FROM pattern_phrases
WHERE enabled
ORDER BY id
    "#;
    sqlx::query_as(QUERY).fetch_all(ex).await
}

/// Inserts (or re-enables) a phrase. `(kind, phrase)` is unique.
pub async fn upsert(
    ex: &mut PgConnection,
    kind: &str,
    phrase: &str,
    source: Option<&str>,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO pattern_phrases (kind, phrase, enabled, source, created_at)
VALUES ($1, $2, true, $3, now())
ON CONFLICT (kind, phrase) DO UPDATE
SET enabled = true,
    source = excluded.source
    "#;
    sqlx::query(QUERY)
        .bind(kind)
        .bind(phrase)
        .bind(source)
        .execute(ex)
        .await
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use {super::*, sqlx::Connection};

    #[tokio::test]
    #[ignore]
    async fn postgres_enabled_phrases_in_insertion_order() {
        let mut db = sqlx::PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        upsert(&mut db, "contract", "on installments", Some("manual"))
            .await
            .unwrap();
        upsert(&mut db, "condition_used", "wie neu", None).await.unwrap();
        upsert(&mut db, "contract", "on installments", Some("manual"))
            .await
            .unwrap();

        let phrases = select_enabled(&mut db).await.unwrap();
        assert_eq!(
            phrases,
            vec![
                ("contract".to_string(), "on installments".to_string()),
                ("condition_used".to_string(), "wie neu".to_string()),
            ]
        );
    }
}
