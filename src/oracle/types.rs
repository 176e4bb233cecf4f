//! Oracle Types
//!
//! Judgments returned by the ground-truth vision model and the errors the
//! oracle can raise.

use serde::{Deserialize, Serialize};

/// Oracle provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleProvider {
    /// Hosted Gemini vision model (API keys, rate limited)
    Gemini,
    /// Ollama vision model (local LLM)
    Ollama,
}

impl Default for OracleProvider {
    fn default() -> Self {
        Self::Gemini
    }
}

/// Confidence tier reported by the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::str::FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(format!("unknown confidence: {}", other)),
        }
    }
}

/// Authoritative spread judgment for one image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleJudgment {
    pub is_two_page_spread: bool,
    /// Split position (0-1000), present only for spreads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_position: Option<i32>,
    pub confidence: Confidence,
    pub reasoning: String,
    /// Provider that produced the judgment
    pub provider: OracleProvider,
}

/// Oracle error types
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle provider not available: {0}")]
    ProviderNotAvailable(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        /// Index of the API key that was throttled, if keys are in use
        key_index: Option<usize>,
        message: String,
    },

    #[error("Malformed oracle response: {0}")]
    MalformedResponse(String),

    #[error("Oracle call timed out after {0} seconds")]
    Timeout(u64),
}

impl OracleError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::ProviderNotAvailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidImage(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::ApiError(_) | Self::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
        }
    }
}
