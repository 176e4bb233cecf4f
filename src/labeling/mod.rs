//! Labeling Module
//!
//! Caller-side policy around the ground-truth oracle: per-call timeout,
//! retry with exponential backoff on rate limits, and bounded parallel batch
//! labeling with cooperative cancellation.

mod labeler;
mod types;

pub use labeler::Labeler;
pub use types::{BatchReport, LabelFailure, LabelOutcome, LabelPolicy, PageRef};
