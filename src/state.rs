//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::labeling::{LabelPolicy, Labeler};
use crate::oracle::{build_oracle, SplitOracle};
use crate::split::{FeatureExtractor, HeuristicDetector};
use crate::training::TrainingCoordinator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
    http: reqwest::Client,
    detector: HeuristicDetector,
    extractor: FeatureExtractor,
    labeler: Labeler,
    trainer: TrainingCoordinator,
}

impl AppState {
    /// Create application state with the oracle named in `config`
    pub fn new(config: Config, db: SqlitePool) -> Self {
        let oracle = build_oracle(&config.oracle);
        Self::with_oracle(config, db, oracle)
    }

    /// Create application state around an explicit oracle
    pub fn with_oracle(config: Config, db: SqlitePool, oracle: Arc<dyn SplitOracle>) -> Self {
        let http = reqwest::Client::new();
        let detector = HeuristicDetector::new(config.detection.analysis_width);
        let extractor = FeatureExtractor::new(config.detection.feature_max_width);
        let labeler = Labeler::new(
            oracle,
            extractor,
            db.clone(),
            LabelPolicy::from(&config.labeling),
        )
        .with_client(http.clone());
        let trainer = TrainingCoordinator::new(db.clone(), config.training.options());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                http,
                detector,
                extractor,
                labeler,
                trainer,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// HTTP client used to fetch images by URL
    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub fn detector(&self) -> &HeuristicDetector {
        &self.inner.detector
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.inner.extractor
    }

    pub fn labeler(&self) -> &Labeler {
        &self.inner.labeler
    }

    pub fn trainer(&self) -> &TrainingCoordinator {
        &self.inner.trainer
    }

    /// Default model namespace
    pub fn namespace(&self) -> &str {
        &self.inner.config.training.namespace
    }
}
