//! Ground-Truth Oracle Module
//!
//! Asks a vision language model whether an image is a two-page spread and
//! where the split belongs. Its answer is the training label for the split
//! model.
//!
//! Supports two backends:
//! - Gemini (hosted, API keys rotated on rate limits)
//! - Ollama vision models (local LLM)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use amnesia_spread::oracle::{build_oracle, SplitOracle};
//!
//! let oracle = build_oracle(&config.oracle);
//! let judgment = oracle.judge(&image_bytes).await?;
//! if judgment.is_two_page_spread {
//!     println!("split at {:?}", judgment.split_position);
//! }
//! ```

mod judgment;
mod keys;
mod provider;
mod types;

use std::sync::Arc;

pub use judgment::{extract_json_object, parse_judgment, SPLIT_PROMPT};
pub use keys::{ApiKey, KeyPool, KeyRotation};
pub use provider::{GeminiOracle, OllamaOracle, SplitOracle};
pub use types::{Confidence, OracleError, OracleJudgment, OracleProvider};

#[cfg(test)]
pub(crate) use provider::MockOracle;

use crate::config::OracleConfig;

/// Build the configured oracle
pub fn build_oracle(config: &OracleConfig) -> Arc<dyn SplitOracle> {
    match config.provider {
        OracleProvider::Gemini => {
            let keys = Arc::new(KeyPool::new(config.api_keys.clone()));
            if keys.is_empty() {
                tracing::warn!("Gemini oracle configured without API keys; labeling will fail");
            }
            Arc::new(GeminiOracle::new(&config.url, &config.model, keys))
        }
        OracleProvider::Ollama => Arc::new(OllamaOracle::new(&config.url, &config.model)),
    }
}
