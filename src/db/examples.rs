//! Training example database operations

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::oracle::Confidence;
use crate::split::{SplitFeatures, TrainingExample};

/// Stored row; decoded leniently into a `TrainingExample`
#[derive(Debug, Clone, sqlx::FromRow)]
struct TrainingExampleRow {
    id: String,
    page_id: String,
    book_id: String,
    features: String,
    ground_truth_position: Option<f64>,
    confidence: String,
    reasoning: String,
    created_at: String,
}

impl From<TrainingExampleRow> for TrainingExample {
    fn from(row: TrainingExampleRow) -> Self {
        let features = serde_json::from_str::<SplitFeatures>(&row.features).unwrap_or_else(|e| {
            tracing::warn!("Unreadable features for example {}: {}", row.id, e);
            SplitFeatures::default()
        });

        let confidence = row.confidence.parse().unwrap_or_else(|e| {
            tracing::warn!("Example {}: {}", row.id, e);
            Confidence::Low
        });

        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default();

        TrainingExample {
            id: row.id,
            page_id: row.page_id,
            book_id: row.book_id,
            features,
            ground_truth_position: row.ground_truth_position.unwrap_or(f64::NAN),
            confidence,
            reasoning: row.reasoning,
            created_at,
        }
    }
}

/// Example count for one book
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BookExampleCount {
    pub book_id: String,
    pub count: i64,
}

/// Training example repository. The corpus is append-only.
pub struct TrainingExampleRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TrainingExampleRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a labeled example
    pub async fn insert(&self, example: &TrainingExample) -> Result<()> {
        let features = serde_json::to_string(&example.features)?;
        let label = Some(example.ground_truth_position).filter(|p| p.is_finite());

        sqlx::query(
            r#"
            INSERT INTO training_examples
                (id, page_id, book_id, features, ground_truth_position, confidence, reasoning, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&example.id)
        .bind(&example.page_id)
        .bind(&example.book_id)
        .bind(&features)
        .bind(label)
        .bind(example.confidence.as_str())
        .bind(&example.reasoning)
        .bind(example.created_at.to_rfc3339())
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Read the whole corpus, oldest first
    pub async fn list_all(&self) -> Result<Vec<TrainingExample>> {
        let rows = sqlx::query_as::<_, TrainingExampleRow>(
            r#"
            SELECT id, page_id, book_id, features, ground_truth_position,
                   confidence, reasoning, created_at
            FROM training_examples
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(TrainingExample::from).collect())
    }

    /// Examples stored for one book
    pub async fn list_for_book(&self, book_id: &str) -> Result<Vec<TrainingExample>> {
        let rows = sqlx::query_as::<_, TrainingExampleRow>(
            r#"
            SELECT id, page_id, book_id, features, ground_truth_position,
                   confidence, reasoning, created_at
            FROM training_examples
            WHERE book_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(book_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(TrainingExample::from).collect())
    }

    /// Total stored examples
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM training_examples")
            .fetch_one(self.pool)
            .await?;

        Ok(count)
    }

    /// Example counts grouped by book, largest first
    pub async fn count_by_book(&self) -> Result<Vec<BookExampleCount>> {
        let counts = sqlx::query_as::<_, BookExampleCount>(
            r#"
            SELECT book_id, COUNT(*) AS count
            FROM training_examples
            GROUP BY book_id
            ORDER BY count DESC, book_id ASC
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(counts)
    }
}
