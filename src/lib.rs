//! Amnesia Spread
//!
//! Detects two-page spreads in scanned book images and finds where to split
//! them. A fast heuristic serves interactive requests; a linear model trained
//! on vision-oracle labels serves the accurate path.
//!
//! # Modules
//!
//! - `split`: pixel analysis, feature extraction, model training and prediction
//! - `oracle`: ground-truth vision model providers
//! - `labeling`: oracle call policy and batch labeling
//! - `db`: SQLite persistence for examples and models
//! - `training`: single-writer retraining and the model cache
//! - `routes`: HTTP API

pub mod config;
pub mod db;
pub mod error;
pub mod labeling;
pub mod oracle;
pub mod routes;
pub mod split;
pub mod state;
pub mod training;
