//! Process configuration
//!
//! Loaded once at startup from the environment (and `.env` via dotenv in the
//! binaries). No reload.

use crate::error::AssistantError;
use crate::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Log filter both binaries use when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub model_name: String,
    pub judge_model_name: String,
    pub embedding_model: String,

    /// Directory holding the raw CSV datasets
    pub context_path: PathBuf,
    /// Directory holding the pre-built vector index
    pub contextdb_path: PathBuf,

    pub port: u16,
    /// Bound on a single HTTP call to the model provider
    pub request_timeout: Duration,
    /// Bound on one whole agent chat, tool calls included
    pub agent_timeout: Duration,
    pub plot_timeout: Duration,
    pub python_bin: String,
    pub max_agent_iterations: usize,
    pub similarity_top_k: usize,

    pub cache_classifications: bool,
    pub fallback_on_primary_error: bool,
}

impl AssistantConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let gemini_api_key = get("GEMINI_API_KEY").ok_or_else(|| {
            AssistantError::Config(
                "GEMINI_API_KEY is not set. Add it to your .env file.".to_string(),
            )
        })?;

        let model_name = get("MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let judge_model_name = get("JUDGE_MODEL_NAME").unwrap_or_else(|| model_name.clone());

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => parse_value("PORT", &raw)?,
            None => 8080,
        };

        Ok(Self {
            gemini_api_key,
            gemini_base_url: get("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            model_name,
            judge_model_name,
            embedding_model: get("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            context_path: PathBuf::from(get("CONTEXT_PATH").unwrap_or_else(|| "./data".to_string())),
            contextdb_path: PathBuf::from(
                get("CONTEXTDB_PATH").unwrap_or_else(|| "./storage".to_string()),
            ),
            port,
            request_timeout: Duration::from_secs(parse_or("REQUEST_TIMEOUT_SECS", get("REQUEST_TIMEOUT_SECS"), 60)?),
            agent_timeout: Duration::from_secs(parse_or("AGENT_TIMEOUT_SECS", get("AGENT_TIMEOUT_SECS"), 300)?),
            plot_timeout: Duration::from_secs(parse_or("PLOT_TIMEOUT_SECS", get("PLOT_TIMEOUT_SECS"), 30)?),
            python_bin: get("PYTHON_BIN").unwrap_or_else(|| "python3".to_string()),
            max_agent_iterations: parse_or("MAX_AGENT_ITERATIONS", get("MAX_AGENT_ITERATIONS"), 15)?,
            similarity_top_k: parse_or("SIMILARITY_TOP_K", get("SIMILARITY_TOP_K"), 3)?,
            cache_classifications: parse_flag("CACHE_CLASSIFICATIONS", get("CACHE_CLASSIFICATIONS"))?,
            fallback_on_primary_error: parse_flag(
                "FALLBACK_ON_PRIMARY_ERROR",
                get("FALLBACK_ON_PRIMARY_ERROR"),
            )?,
        })
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse().map_err(|_| {
        AssistantError::Config(format!("{} has an invalid value: {}", key, raw))
    })
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_flag(key: &str, raw: Option<String>) -> Result<bool> {
    let Some(raw) = raw else {
        return Ok(false);
    };

    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AssistantError::Config(format!(
            "{} must be a boolean, got: {}",
            key, raw
        ))),
    }
}
