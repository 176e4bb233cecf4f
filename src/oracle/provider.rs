//! Oracle Providers
//!
//! Defines the oracle trait and implementations for the supported vision
//! model backends.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;

use super::judgment::{parse_judgment, SPLIT_PROMPT};
use super::keys::KeyRotation;
use super::types::{OracleError, OracleJudgment, OracleProvider};

/// Ground-truth oracle trait
#[async_trait]
pub trait SplitOracle: Send + Sync {
    /// Get the provider type
    fn provider_type(&self) -> OracleProvider;

    /// Check if the provider can currently be called
    async fn is_available(&self) -> bool;

    /// Judge whether the image is a spread and where to split it
    async fn judge(&self, image_data: &[u8]) -> Result<OracleJudgment, OracleError>;
}

fn mime_type(image_data: &[u8]) -> Result<&'static str, OracleError> {
    image::guess_format(image_data)
        .map(|format| format.to_mime_type())
        .map_err(|e| OracleError::InvalidImage(e.to_string()))
}

/// Gemini vision model provider
pub struct GeminiOracle {
    /// API base URL
    base_url: String,
    /// Model name (e.g., "gemini-2.0-flash")
    model: String,
    keys: Arc<dyn KeyRotation>,
    client: reqwest::Client,
}

impl GeminiOracle {
    pub const DEFAULT_URL: &'static str = "https://generativelanguage.googleapis.com";
    pub const DEFAULT_MODEL: &'static str = "gemini-2.0-flash";

    pub fn new(base_url: &str, model: &str, keys: Arc<dyn KeyRotation>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            keys,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SplitOracle for GeminiOracle {
    fn provider_type(&self) -> OracleProvider {
        OracleProvider::Gemini
    }

    async fn is_available(&self) -> bool {
        self.keys.current().is_some()
    }

    async fn judge(&self, image_data: &[u8]) -> Result<OracleJudgment, OracleError> {
        let key = self.keys.current().ok_or_else(|| {
            OracleError::ProviderNotAvailable("no Gemini API keys configured".to_string())
        })?;

        let mime = mime_type(image_data)?;
        let image_base64 = base64::engine::general_purpose::STANDARD.encode(image_data);

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let request = serde_json::json!({
            "contents": [{
                "parts": [
                    { "text": SPLIT_PROMPT },
                    { "inline_data": { "mime_type": mime, "data": image_base64 } }
                ]
            }],
            "generationConfig": { "temperature": 0.0 }
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", key.value.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::ApiError(format!("Failed to call Gemini: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            self.keys.report_rate_limited(key.index);
            return Err(OracleError::RateLimited {
                key_index: Some(key.index),
                message: format!("Gemini key #{} throttled: {}", key.index, body),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::ApiError(format!(
                "Gemini returned {}: {}",
                status, body
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OracleError::MalformedResponse(format!("Failed to parse response: {}", e)))?;

        let text: String = result["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
            .unwrap_or_default();

        parse_judgment(&text, OracleProvider::Gemini)
    }
}

/// Ollama vision model provider
pub struct OllamaOracle {
    /// Ollama API URL
    base_url: String,
    /// Model name (e.g., "llava", "qwen2.5vl")
    model: String,
    client: reqwest::Client,
}

impl OllamaOracle {
    pub const DEFAULT_URL: &'static str = "http://localhost:11434";
    pub const DEFAULT_MODEL: &'static str = "llava";

    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn default_url() -> Self {
        Self::new(Self::DEFAULT_URL, Self::DEFAULT_MODEL)
    }
}

#[async_trait]
impl SplitOracle for OllamaOracle {
    fn provider_type(&self) -> OracleProvider {
        OracleProvider::Ollama
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn judge(&self, image_data: &[u8]) -> Result<OracleJudgment, OracleError> {
        mime_type(image_data)?;

        let url = format!("{}/api/generate", self.base_url);
        let image_base64 = base64::engine::general_purpose::STANDARD.encode(image_data);

        let request = serde_json::json!({
            "model": self.model,
            "prompt": SPLIT_PROMPT,
            "images": [image_base64],
            "stream": false,
            "options": { "temperature": 0 }
        });

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::ApiError(format!("Failed to call Ollama: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::RateLimited {
                key_index: None,
                message: format!("Ollama throttled: {}", body),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::ApiError(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OracleError::MalformedResponse(format!("Failed to parse response: {}", e)))?;

        let text = result["response"].as_str().unwrap_or("");
        parse_judgment(text, OracleProvider::Ollama)
    }
}

/// Mock oracle for testing. Scripted results are returned first, then the
/// fallback judgment on every later call.
#[cfg(test)]
pub(crate) struct MockOracle {
    pub fallback: OracleJudgment,
    pub available: bool,
    scripted: parking_lot::Mutex<std::collections::VecDeque<Result<OracleJudgment, OracleError>>>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockOracle {
    pub fn spread(position: i32) -> Self {
        Self::with_fallback(OracleJudgment {
            is_two_page_spread: true,
            split_position: Some(position),
            confidence: super::types::Confidence::High,
            reasoning: "mock gutter".to_string(),
            provider: OracleProvider::Ollama,
        })
    }

    pub fn single_page() -> Self {
        Self::with_fallback(OracleJudgment {
            is_two_page_spread: false,
            split_position: None,
            confidence: super::types::Confidence::Medium,
            reasoning: "mock single page".to_string(),
            provider: OracleProvider::Ollama,
        })
    }

    pub fn with_fallback(fallback: OracleJudgment) -> Self {
        Self {
            fallback,
            available: true,
            scripted: parking_lot::Mutex::new(Default::default()),
            calls: Default::default(),
        }
    }

    /// Queue a result to be returned before the fallback
    pub fn then(self, result: Result<OracleJudgment, OracleError>) -> Self {
        self.scripted.lock().push_back(result);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl SplitOracle for MockOracle {
    fn provider_type(&self) -> OracleProvider {
        self.fallback.provider
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn judge(&self, _image_data: &[u8]) -> Result<OracleJudgment, OracleError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        match self.scripted.lock().pop_front() {
            Some(result) => result,
            None => Ok(self.fallback.clone()),
        }
    }
}
