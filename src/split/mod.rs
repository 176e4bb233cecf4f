//! Split Detection Module
//!
//! Detects whether a scanned image is a two-page spread and where to cut it.
//!
//! - `profile`: per-column statistics shared by both detection paths
//! - `heuristic`: fast interactive estimate, never fails
//! - `features`: rich feature vector for training and inference
//! - `trainer` / `model`: linear model approximating the vision oracle
//!
//! All positions use the 0-1000 permille scale (500 = center).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use amnesia_spread::split::{FeatureExtractor, GrayRaster, HeuristicDetector};
//!
//! let raster = GrayRaster::decode(&bytes)?;
//! let quick = HeuristicDetector::default().detect(&raster);
//! let features = FeatureExtractor::default().extract(&raster, None)?;
//! let position = model.predict(&features);
//! ```

mod features;
mod heuristic;
mod model;
mod profile;
mod raster;
mod trainer;
mod types;

pub use features::{FeatureExtractor, SplitFeatures, TextBoundaries};
pub use heuristic::{column_score, pick_center_column, BandPick, HeuristicDetector, DEFAULT_ANALYSIS_WIDTH};
pub use model::{
    clamp_prediction, normalized_terms, FeatureWeights, SplitCoefficients, SplitModel, MAX_PREDICTION,
    MIN_PREDICTION, TERM_COUNT, TERM_NAMES,
};
pub use profile::{profile_column, profile_columns, ColumnProfile, ProfileParams};
pub use raster::{GrayRaster, ImageSource};
pub use trainer::{is_valid_example, train, TrainError, TrainOptions, TrainingExample, MIN_TRAINING_EXAMPLES};
pub use types::{to_permille, BookContext, BookSize, HeuristicSplit, SplitError, CENTER_POSITION, MAX_POSITION};
