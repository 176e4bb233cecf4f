//! Split model database operations

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{AppError, Result};
use crate::split::{SplitCoefficients, SplitModel};

#[derive(Debug, Clone, sqlx::FromRow)]
struct SplitModelRow {
    coefficients: String,
    trained_at: String,
    training_size: i64,
    validation_mse: Option<f64>,
}

impl TryFrom<SplitModelRow> for SplitModel {
    type Error = AppError;

    fn try_from(row: SplitModelRow) -> Result<Self> {
        let coefficients: SplitCoefficients = serde_json::from_str(&row.coefficients)?;
        let trained_at = DateTime::parse_from_rfc3339(&row.trained_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| AppError::Internal(format!("Invalid trained_at {:?}: {}", row.trained_at, e)))?;

        Ok(SplitModel {
            coefficients,
            trained_at,
            training_size: row.training_size.max(0) as usize,
            validation_mse: row.validation_mse.unwrap_or(f64::NAN),
        })
    }
}

/// Split model repository, one model per namespace
pub struct SplitModelRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SplitModelRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Load the current model for a namespace
    pub async fn load(&self, namespace: &str) -> Result<Option<SplitModel>> {
        let row = sqlx::query_as::<_, SplitModelRow>(
            r#"
            SELECT coefficients, trained_at, training_size, validation_mse
            FROM split_models
            WHERE namespace = ?
            "#,
        )
        .bind(namespace)
        .fetch_optional(self.pool)
        .await?;

        row.map(SplitModel::try_from).transpose()
    }

    /// Replace the model for a namespace in a single statement
    pub async fn replace(&self, namespace: &str, model: &SplitModel) -> Result<()> {
        let coefficients = serde_json::to_string(&model.coefficients)?;
        let validation_mse = Some(model.validation_mse).filter(|v| v.is_finite());

        sqlx::query(
            r#"
            INSERT INTO split_models (namespace, coefficients, trained_at, training_size, validation_mse)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(namespace) DO UPDATE SET
                coefficients = excluded.coefficients,
                trained_at = excluded.trained_at,
                training_size = excluded.training_size,
                validation_mse = excluded.validation_mse
            "#,
        )
        .bind(namespace)
        .bind(&coefficients)
        .bind(model.trained_at.to_rfc3339())
        .bind(model.training_size as i64)
        .bind(validation_mse)
        .execute(self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    fn model(bias: f64, training_size: usize) -> SplitModel {
        let mut coefficients = SplitCoefficients::with_bias(bias);
        coefficients.weights.text_gap_center = 1.25;
        SplitModel {
            coefficients,
            trained_at: Utc::now(),
            training_size,
            validation_mse: 4.5,
        }
    }

    #[tokio::test]
    async fn test_load_missing() {
        let pool = memory_pool().await;
        let repo = SplitModelRepository::new(&pool);
        assert!(repo.load("default").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_overwrites_namespace() {
        let pool = memory_pool().await;
        let repo = SplitModelRepository::new(&pool);

        repo.replace("default", &model(490.0, 20)).await.unwrap();
        repo.replace("default", &model(505.0, 40)).await.unwrap();
        repo.replace("other", &model(300.0, 12)).await.unwrap();

        let loaded = repo.load("default").await.unwrap().unwrap();
        assert_eq!(loaded.coefficients.bias, 505.0);
        assert_eq!(loaded.coefficients.weights.text_gap_center, 1.25);
        assert_eq!(loaded.training_size, 40);
        assert_eq!(loaded.validation_mse, 4.5);

        let other = repo.load("other").await.unwrap().unwrap();
        assert_eq!(other.coefficients.bias, 300.0);
    }

    #[tokio::test]
    async fn test_coefficients_reload_bit_exact() {
        let pool = memory_pool().await;
        let repo = SplitModelRepository::new(&pool);

        let mut stored = model(497.123456789012, 30);
        stored.coefficients.weights.center_brightest_p10 = 0.020528645343459558;
        stored.coefficients.weights.gutter_width = -1.0 / 3.0;
        stored.coefficients.weights.text_gap_center = 7.0e-13;
        repo.replace("default", &stored).await.unwrap();

        let loaded = repo.load("default").await.unwrap().unwrap();
        assert_eq!(loaded.coefficients, stored.coefficients);
        assert_eq!(
            loaded.coefficients.weights.center_brightest_p10.to_bits(),
            0.020528645343459558f64.to_bits()
        );
    }

    #[tokio::test]
    async fn test_partial_coefficients_load_with_zero_defaults() {
        let pool = memory_pool().await;
        sqlx::query(
            r#"
            INSERT INTO split_models (namespace, coefficients, trained_at, training_size, validation_mse)
            VALUES ('legacy', '{"bias": 497.0, "predictedPosition": 3.0}', '2026-03-01T12:00:00+00:00', 15, NULL)
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let loaded = SplitModelRepository::new(&pool).load("legacy").await.unwrap().unwrap();
        assert_eq!(loaded.coefficients.bias, 497.0);
        assert_eq!(loaded.coefficients.weights.predicted_position, 3.0);
        assert_eq!(loaded.coefficients.weights.gutter_width, 0.0);
        assert!(loaded.validation_mse.is_nan());
    }
}
