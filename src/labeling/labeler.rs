//! Labeler
//!
//! Runs the oracle against pages, extracts features, and appends every
//! spread to the training corpus.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use sqlx::SqlitePool;
use tokio::sync::watch;
use uuid::Uuid;

use super::types::{BatchReport, LabelFailure, LabelOutcome, LabelPolicy, PageRef};
use crate::db::TrainingExampleRepository;
use crate::error::{AppError, Result};
use crate::oracle::{OracleError, OracleJudgment, SplitOracle};
use crate::split::{FeatureExtractor, TrainingExample};

/// Oracle labeling service
pub struct Labeler {
    client: reqwest::Client,
    oracle: Arc<dyn SplitOracle>,
    extractor: FeatureExtractor,
    db: SqlitePool,
    policy: LabelPolicy,
}

impl Labeler {
    pub fn new(
        oracle: Arc<dyn SplitOracle>,
        extractor: FeatureExtractor,
        db: SqlitePool,
        policy: LabelPolicy,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            oracle,
            extractor,
            db,
            policy,
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn policy(&self) -> &LabelPolicy {
        &self.policy
    }

    /// Whether the oracle can currently be called
    pub async fn oracle_available(&self) -> bool {
        self.oracle.is_available().await
    }

    /// Label one page; the example is stored only when the page is a spread
    pub async fn label_page(&self, page: &PageRef) -> Result<LabelOutcome> {
        self.label_until(page, None)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Labeling of page {} was cancelled", page.page_id)))
    }

    /// Label one page unless `cancel` is set before an oracle call; `None` when cancelled
    async fn label_until(
        &self,
        page: &PageRef,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> Result<Option<LabelOutcome>> {
        let image_data = page.source.load(&self.client).await?;

        // Decoding first rejects unusable images before spending an oracle call
        let extractor = self.extractor;
        let context = page.context;
        let (image_data, features) = tokio::task::spawn_blocking(move || {
            let features = extractor.extract_bytes(&image_data, context);
            (image_data, features)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Feature extraction task failed: {}", e)))?;
        let features = features?;

        let Some(judgment) = self.judge_with_retry(&image_data, cancel).await? else {
            tracing::info!("Labeling of page {} cancelled before the oracle call", page.page_id);
            return Ok(None);
        };

        let position = match (judgment.is_two_page_spread, judgment.split_position) {
            (true, Some(position)) => position,
            _ => {
                tracing::info!(
                    "Page {} of book {} is a single page, not stored",
                    page.page_id,
                    page.book_id
                );
                return Ok(Some(LabelOutcome {
                    judgment,
                    example: None,
                }));
            }
        };

        let example = TrainingExample {
            id: Uuid::new_v4().to_string(),
            page_id: page.page_id.clone(),
            book_id: page.book_id.clone(),
            features,
            ground_truth_position: f64::from(position),
            confidence: judgment.confidence,
            reasoning: judgment.reasoning.clone(),
            created_at: Utc::now(),
        };

        TrainingExampleRepository::new(&self.db).insert(&example).await?;
        tracing::info!(
            "Stored label for page {} of book {}: split at {} ({:?} confidence)",
            page.page_id,
            page.book_id,
            position,
            judgment.confidence
        );

        Ok(Some(LabelOutcome {
            judgment,
            example: Some(example),
        }))
    }

    /// Label pages with bounded parallelism until done or cancelled.
    ///
    /// Once `cancel` reads `true` no further oracle calls are started, retries
    /// included; calls already in flight complete and their labels are kept.
    pub async fn label_batch(&self, pages: Vec<PageRef>, cancel: watch::Receiver<bool>) -> BatchReport {
        let total = pages.len();
        let cancel = &cancel;

        let results: Vec<(String, Result<Option<LabelOutcome>>)> = futures::stream::iter(pages)
            .take_while(|_| {
                let cancelled = is_cancelled(Some(cancel));
                async move { !cancelled }
            })
            .map(|page| async move {
                let result = self.label_until(&page, Some(cancel)).await;
                (page.page_id, result)
            })
            .buffer_unordered(self.policy.concurrency.max(1))
            .collect()
            .await;

        let mut report = BatchReport {
            cancelled: total - results.len(),
            ..BatchReport::default()
        };

        for (page_id, result) in results {
            match result {
                Ok(Some(LabelOutcome { example: Some(_), .. })) => report.labeled += 1,
                Ok(Some(LabelOutcome { example: None, .. })) => report.skipped += 1,
                Ok(None) => report.cancelled += 1,
                Err(e) => {
                    tracing::error!("Failed to label page {}: {}", page_id, e);
                    report.failed += 1;
                    report.failures.push(LabelFailure {
                        page_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Batch labeling finished: {} labeled, {} single pages, {} failed, {} cancelled",
            report.labeled,
            report.skipped,
            report.failed,
            report.cancelled
        );

        report
    }

    /// Call the oracle under the timeout, retrying throttled or timed-out calls.
    ///
    /// Returns `Ok(None)` when `cancel` is set before a call would be made.
    async fn judge_with_retry(
        &self,
        image_data: &[u8],
        cancel: Option<&watch::Receiver<bool>>,
    ) -> std::result::Result<Option<OracleJudgment>, OracleError> {
        let mut attempt = 0;
        loop {
            if is_cancelled(cancel) {
                return Ok(None);
            }

            let result = match tokio::time::timeout(self.policy.timeout, self.oracle.judge(image_data)).await {
                Ok(result) => result,
                Err(_) => Err(OracleError::Timeout(self.policy.timeout.as_secs())),
            };

            let error = match result {
                Ok(judgment) => return Ok(Some(judgment)),
                Err(e @ (OracleError::RateLimited { .. } | OracleError::Timeout(_))) => e,
                Err(e) => return Err(e),
            };

            if attempt >= self.policy.max_retries {
                return Err(error);
            }

            let delay = self.policy.backoff(attempt);
            tracing::warn!(
                "Oracle call failed ({}), retry {}/{} in {:?}",
                error,
                attempt + 1,
                self.policy.max_retries,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn is_cancelled(cancel: Option<&watch::Receiver<bool>>) -> bool {
    cancel.is_some_and(|rx| *rx.borrow())
}
