//! Training Coordinator
//!
//! One trainer at a time per model namespace. A finished run replaces the
//! stored model and the cached copy together; readers keep whatever snapshot
//! they already hold.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use sqlx::SqlitePool;

use crate::db::{SplitModelRepository, TrainingExampleRepository};
use crate::error::{AppError, Result};
use crate::split::{train, SplitModel, TrainOptions};

type NamespaceLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Serializes retraining and caches the current model per namespace
pub struct TrainingCoordinator {
    db: SqlitePool,
    options: TrainOptions,
    locks: NamespaceLocks,
    models: RwLock<HashMap<String, Arc<SplitModel>>>,
}

/// Exclusive training slot for one namespace.
///
/// Dropping it frees the slot and forgets the namespace's lock once nobody
/// else holds a handle to it, so the lock map only tracks active namespaces.
struct TrainingSlot<'a> {
    locks: &'a NamespaceLocks,
    namespace: String,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for TrainingSlot<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        self.guard.take();
        if locks
            .get(&self.namespace)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.namespace);
        }
    }
}

impl TrainingCoordinator {
    pub fn new(db: SqlitePool, options: TrainOptions) -> Self {
        Self {
            db,
            options,
            locks: Mutex::new(HashMap::new()),
            models: RwLock::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> TrainOptions {
        self.options
    }

    fn namespace_lock(&self, namespace: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(namespace.to_string())
            .or_default()
            .clone()
    }

    fn acquire(&self, namespace: &str) -> Result<TrainingSlot<'_>> {
        let guard = self.namespace_lock(namespace).try_lock_owned().map_err(|_| {
            AppError::Conflict(format!("Training already running for namespace '{}'", namespace))
        })?;
        Ok(TrainingSlot {
            locks: &self.locks,
            namespace: namespace.to_string(),
            guard: Some(guard),
        })
    }

    /// Retrain `namespace` from the full corpus with the configured options
    pub async fn retrain(&self, namespace: &str) -> Result<Arc<SplitModel>> {
        self.retrain_with(namespace, self.options).await
    }

    /// Retrain `namespace`; fails with `Conflict` if a run is already active
    pub async fn retrain_with(&self, namespace: &str, options: TrainOptions) -> Result<Arc<SplitModel>> {
        let _slot = self.acquire(namespace)?;

        let examples = TrainingExampleRepository::new(&self.db).list_all().await?;
        tracing::info!(
            "Retraining split model '{}' on {} stored examples",
            namespace,
            examples.len()
        );

        let model = tokio::task::spawn_blocking(move || train(&examples, options))
            .await
            .map_err(|e| AppError::Internal(format!("Training task failed: {}", e)))??;

        SplitModelRepository::new(&self.db).replace(namespace, &model).await?;

        let model = Arc::new(model);
        self.models
            .write()
            .insert(namespace.to_string(), Arc::clone(&model));

        tracing::info!(
            "Split model '{}' replaced: {} training examples, validation MSE {:.2}",
            namespace,
            model.training_size,
            model.validation_mse
        );

        Ok(model)
    }

    /// Current model for `namespace`, loaded from the database on first use
    pub async fn current_model(&self, namespace: &str) -> Result<Option<Arc<SplitModel>>> {
        let cached = self.models.read().get(namespace).cloned();
        if cached.is_some() {
            return Ok(cached);
        }

        let Some(model) = SplitModelRepository::new(&self.db).load(namespace).await? else {
            return Ok(None);
        };

        let model = Arc::new(model);
        let mut models = self.models.write();
        // A retrain may have finished while loading; its model wins
        let cached = models
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::clone(&model));
        Ok(Some(Arc::clone(cached)))
    }
}
