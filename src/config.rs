//! Configuration management for the Amnesia spread service

use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::oracle::{GeminiOracle, OllamaOracle, OracleProvider};
use crate::split::{TrainOptions, DEFAULT_ANALYSIS_WIDTH};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub oracle: OracleConfig,
    pub labeling: LabelingConfig,
    pub detection: DetectionConfig,
    pub training: TrainingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    pub provider: OracleProvider,
    pub url: String,
    pub model: String,
    #[serde(default)]
    pub api_keys: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelingConfig {
    /// Per-call oracle timeout
    pub timeout_secs: u64,
    /// Retries after a rate-limited or timed-out call
    pub max_retries: u32,
    /// Oracle calls in flight during batch labeling
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    pub analysis_width: u32,
    /// Downsample feature extraction to this width; `None` keeps full resolution
    pub feature_max_width: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub seed: Option<u64>,
    pub namespace: String,
}

impl TrainingConfig {
    pub fn options(&self) -> TrainOptions {
        TrainOptions {
            epochs: self.epochs,
            learning_rate: self.learning_rate,
            seed: self.seed,
        }
    }
}

impl OracleConfig {
    fn defaults_for(provider: OracleProvider) -> (&'static str, &'static str) {
        match provider {
            OracleProvider::Gemini => (GeminiOracle::DEFAULT_URL, GeminiOracle::DEFAULT_MODEL),
            OracleProvider::Ollama => (OllamaOracle::DEFAULT_URL, OllamaOracle::DEFAULT_MODEL),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let defaults = TrainOptions::default();
        let (oracle_url, oracle_model) = OracleConfig::defaults_for(OracleProvider::Ollama);
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: "sqlite:./spread.db".to_string(),
            },
            oracle: OracleConfig {
                provider: OracleProvider::Ollama,
                url: oracle_url.to_string(),
                model: oracle_model.to_string(),
                api_keys: Vec::new(),
            },
            labeling: LabelingConfig {
                timeout_secs: 60,
                max_retries: 3,
                concurrency: 4,
            },
            detection: DetectionConfig {
                analysis_width: DEFAULT_ANALYSIS_WIDTH,
                feature_max_width: None,
            },
            training: TrainingConfig {
                epochs: defaults.epochs,
                learning_rate: defaults.learning_rate,
                seed: defaults.seed,
                namespace: "default".to_string(),
            },
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}", key, value);
            default
        }),
        Err(_) => default,
    }
}

/// Parse an optional environment variable; unset, empty or invalid is `None`
fn env_opt<T: FromStr>(key: &str) -> Option<T> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Load configuration from the environment; unset or unparsable values use defaults
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let provider = match env::var("ORACLE_PROVIDER")
            .unwrap_or_else(|_| "ollama".to_string())
            .to_lowercase()
            .as_str()
        {
            "gemini" => OracleProvider::Gemini,
            _ => OracleProvider::Ollama,
        };
        let (oracle_url, oracle_model) = OracleConfig::defaults_for(provider);

        Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: env_or("SERVER_PORT", defaults.server.port),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
            },
            oracle: OracleConfig {
                provider,
                url: env::var("ORACLE_URL").unwrap_or_else(|_| oracle_url.to_string()),
                model: env::var("ORACLE_MODEL").unwrap_or_else(|_| oracle_model.to_string()),
                api_keys: env::var("ORACLE_API_KEYS")
                    .map(|csv| {
                        csv.split(',')
                            .map(|k| k.trim().to_string())
                            .filter(|k| !k.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            labeling: LabelingConfig {
                timeout_secs: env_or("ORACLE_TIMEOUT_SECS", defaults.labeling.timeout_secs),
                max_retries: env_or("ORACLE_MAX_RETRIES", defaults.labeling.max_retries),
                concurrency: env_or("LABEL_CONCURRENCY", defaults.labeling.concurrency).max(1),
            },
            detection: DetectionConfig {
                analysis_width: env_or("HEURISTIC_ANALYSIS_WIDTH", defaults.detection.analysis_width),
                feature_max_width: env_opt("FEATURE_MAX_WIDTH"),
            },
            training: TrainingConfig {
                epochs: env_or("TRAIN_EPOCHS", defaults.training.epochs),
                learning_rate: env_or("TRAIN_LEARNING_RATE", defaults.training.learning_rate),
                seed: env_opt("TRAIN_SEED"),
                namespace: env::var("MODEL_NAMESPACE").unwrap_or(defaults.training.namespace),
            },
        }
    }
}
