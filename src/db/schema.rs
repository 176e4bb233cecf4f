//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL)
        .execute(pool)
        .await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Labeled spreads (append-only)
CREATE TABLE IF NOT EXISTS training_examples (
    id TEXT PRIMARY KEY,
    page_id TEXT NOT NULL,
    book_id TEXT NOT NULL,
    features TEXT NOT NULL,
    ground_truth_position REAL,
    confidence TEXT NOT NULL,
    reasoning TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_training_examples_book ON training_examples(book_id);
CREATE INDEX IF NOT EXISTS idx_training_examples_created ON training_examples(created_at);

-- Trained split models, one per namespace, replaced wholesale on retrain
CREATE TABLE IF NOT EXISTS split_models (
    namespace TEXT PRIMARY KEY,
    coefficients TEXT NOT NULL,
    trained_at TEXT NOT NULL,
    training_size INTEGER NOT NULL,
    validation_mse REAL
);
"#;
