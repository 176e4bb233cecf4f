//! Split Model Trainer
//!
//! Fits the linear split model with full-batch gradient descent on the
//! labeled corpus. Invalid examples are dropped, never fatal.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::features::SplitFeatures;
use super::model::{normalized_terms, FeatureWeights, SplitCoefficients, SplitModel, TERM_COUNT};
use crate::oracle::Confidence;

/// Fewest valid examples a training run accepts
pub const MIN_TRAINING_EXAMPLES: usize = 10;

/// Share of valid examples used for fitting; the rest is validation
const TRAIN_FRACTION: f64 = 0.8;

/// Per-example error is clipped to +/- this before accumulation
const ERROR_CLIP: f64 = 10.0;

/// A labeled spread: features plus the oracle's split position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingExample {
    pub id: String,
    pub page_id: String,
    pub book_id: String,
    pub features: SplitFeatures,
    /// Oracle split position (0-1000); NaN when the stored label is unusable
    pub ground_truth_position: f64,
    pub confidence: Confidence,
    #[serde(default)]
    pub reasoning: String,
    pub created_at: DateTime<Utc>,
}

/// Whether an example can take part in training
pub fn is_valid_example(example: &TrainingExample) -> bool {
    example.ground_truth_position.is_finite() && example.features.is_finite()
}

/// Training error types
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error(
        "Insufficient training data: {valid} valid of {total} examples (need at least {min})",
        min = MIN_TRAINING_EXAMPLES
    )]
    InsufficientData { valid: usize, total: usize },
}

/// Gradient descent settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainOptions {
    pub epochs: usize,
    pub learning_rate: f64,
    /// Fixed shuffle seed; `None` uses system randomness
    pub seed: Option<u64>,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 500,
            learning_rate: 1e-4,
            seed: None,
        }
    }
}

/// Train a split model on `examples`
pub fn train(examples: &[TrainingExample], options: TrainOptions) -> Result<SplitModel, TrainError> {
    use rand::SeedableRng;

    let mut valid: Vec<&TrainingExample> = examples.iter().filter(|e| is_valid_example(e)).collect();
    let total = examples.len();

    if valid.len() < total {
        tracing::warn!(
            "Skipping {} invalid training examples out of {}",
            total - valid.len(),
            total
        );
    }
    if valid.len() < MIN_TRAINING_EXAMPLES {
        return Err(TrainError::InsufficientData {
            valid: valid.len(),
            total,
        });
    }

    let mut seeded_rng;
    let mut thread_rng;
    let rng: &mut dyn rand::RngCore = match options.seed {
        Some(s) => {
            seeded_rng = rand::rngs::StdRng::seed_from_u64(s);
            &mut seeded_rng
        }
        None => {
            thread_rng = rand::rng();
            &mut thread_rng
        }
    };
    valid.shuffle(rng);

    let labels: Vec<f64> = valid.iter().map(|e| e.ground_truth_position).collect();
    let mut bias = median(&labels);

    let split_at = (valid.len() as f64 * TRAIN_FRACTION).floor() as usize;
    let (train_set, validation_set) = valid.split_at(split_at);

    let samples: Vec<([f64; TERM_COUNT], f64)> = train_set
        .iter()
        .map(|e| (normalized_terms(&e.features), e.ground_truth_position))
        .collect();

    let mut weights = [0.0; TERM_COUNT];
    let n = samples.len() as f64;

    for _ in 0..options.epochs {
        let mut bias_gradient = 0.0;
        let mut gradients = [0.0; TERM_COUNT];

        for (terms, label) in &samples {
            let prediction = bias + dot(&weights, terms);
            let error = (label - prediction).clamp(-ERROR_CLIP, ERROR_CLIP);
            bias_gradient += error;
            for (g, t) in gradients.iter_mut().zip(terms.iter()) {
                *g += error * t;
            }
        }

        bias += options.learning_rate * bias_gradient / n;
        for (w, g) in weights.iter_mut().zip(gradients.iter()) {
            *w += options.learning_rate * g / n;
        }
    }

    let coefficients = SplitCoefficients {
        bias,
        weights: FeatureWeights::from_array(weights),
    };

    let validation_mse = validation_set
        .iter()
        .map(|e| (e.ground_truth_position - coefficients.raw_output(&e.features)).powi(2))
        .sum::<f64>()
        / validation_set.len().max(1) as f64;

    tracing::info!(
        "Trained split model on {} examples ({} validation, {} skipped): bias {:.1}, validation MSE {:.2}",
        train_set.len(),
        validation_set.len(),
        total - valid.len(),
        coefficients.bias,
        validation_mse
    );

    Ok(SplitModel {
        coefficients,
        trained_at: Utc::now(),
        training_size: train_set.len(),
        validation_mse,
    })
}

fn dot(weights: &[f64; TERM_COUNT], terms: &[f64; TERM_COUNT]) -> f64 {
    weights.iter().zip(terms.iter()).map(|(w, t)| w * t).sum()
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
