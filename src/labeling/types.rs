//! Labeling Types

use std::time::Duration;

use serde::Serialize;

use crate::config::LabelingConfig;
use crate::oracle::OracleJudgment;
use crate::split::{BookContext, ImageSource, TrainingExample};

/// A page to be labeled by the oracle
#[derive(Debug, Clone)]
pub struct PageRef {
    pub page_id: String,
    pub book_id: String,
    pub source: ImageSource,
    pub context: Option<BookContext>,
}

/// Result of labeling one page
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelOutcome {
    pub judgment: OracleJudgment,
    /// Stored example; `None` when the page is not a spread
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<TrainingExample>,
}

/// A page that could not be labeled
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelFailure {
    pub page_id: String,
    pub error: String,
}

/// Summary of a batch labeling run
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Spreads labeled and stored
    pub labeled: usize,
    /// Pages the oracle judged to be single pages
    pub skipped: usize,
    pub failed: usize,
    /// Pages left unlabeled because the batch was cancelled
    pub cancelled: usize,
    pub failures: Vec<LabelFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.labeled + self.skipped + self.failed + self.cancelled
    }
}

/// Caller-side oracle policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelPolicy {
    /// Upper bound for a single oracle call
    pub timeout: Duration,
    /// Retries after a rate-limited or timed-out call
    pub max_retries: u32,
    /// First retry delay; doubled on every further attempt
    pub initial_backoff: Duration,
    /// Oracle calls in flight during a batch
    pub concurrency: usize,
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            concurrency: 4,
        }
    }
}

impl From<&LabelingConfig> for LabelPolicy {
    fn from(config: &LabelingConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            concurrency: config.concurrency.max(1),
            ..Self::default()
        }
    }
}

impl LabelPolicy {
    /// Delay before retry number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff.saturating_mul(1u32 << attempt.min(16))
    }
}
