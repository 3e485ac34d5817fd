use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::filter::{BatchPolicy, RequiredField};
use crate::llm::CompletionConfig;
use crate::scraping::{Audience, CollectOptions};
use crate::utils;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_MAX_TOKENS: u32 = 4000;
const DEFAULT_TEMPERATURE: f32 = 0.2;
const DEFAULT_BATCH_SIZE: usize = 7;
const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:8081";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("OPENAI_API_KEY is not set; add it to the environment or the .env file")]
    MissingApiKey,
    #[error("unable to read config file {path}: {reason}")]
    File { path: String, reason: String },
}

/// The two deployments of the pipeline differ only in these fixed choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Cli,
    Service,
}

impl Variant {
    pub fn default_model(self) -> &'static str {
        match self {
            Variant::Cli => "gpt-4o-mini",
            Variant::Service => "gpt-3.5-turbo",
        }
    }

    pub fn required_fields(self) -> Vec<RequiredField> {
        match self {
            Variant::Cli => vec![
                RequiredField::Title,
                RequiredField::Date,
                RequiredField::Location,
                RequiredField::Link,
                RequiredField::Description,
            ],
            Variant::Service => vec![
                RequiredField::Title,
                RequiredField::Date,
                RequiredField::Link,
                RequiredField::Description,
            ],
        }
    }

    pub fn blank_description_is_empty(self) -> bool {
        matches!(self, Variant::Service)
    }

    pub fn detail_delay(self) -> Duration {
        match self {
            Variant::Cli => Duration::from_millis(300),
            Variant::Service => Duration::ZERO,
        }
    }
}

/// On-disk overrides; every field is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// `0` sends every complete event.
    pub batch_size: Option<usize>,
    pub audience: Option<Audience>,
    pub server_addr: Option<String>,
    pub cors_origin: Option<String>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let to_error = |reason: String| ConfigError::File {
            path: path.display().to_string(),
            reason,
        };
        let contents = fs::read_to_string(path).map_err(|err| to_error(err.to_string()))?;
        serde_json::from_str(&contents).map_err(|err| to_error(err.to_string()))
    }

    /// An unreadable or malformed file is logged and treated as absent.
    pub fn read_or_default(path: &Path) -> Self {
        Self::read(path).unwrap_or_else(|err| {
            warn!(error = %err, "ignoring config file");
            Self::default()
        })
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub variant: Variant,
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub batch_size: Option<usize>,
    pub audience: Audience,
    pub server_addr: String,
    pub cors_origin: String,
    pub listing_timeout: Duration,
    pub detail_timeout: Duration,
    pub completion_timeout: Duration,
}

impl Settings {
    /// Config file first, then environment variables on top.
    pub fn load(variant: Variant) -> Result<Self, ConfigError> {
        let path = utils::config_path();
        let file = FileConfig::read(&path)?;
        debug!(path = %path.display(), "loaded config file");
        Ok(Self::from_sources(variant, file, |key| std::env::var(key).ok()))
    }

    /// Like `load`, but a broken config file falls back to environment and
    /// defaults instead of failing.
    pub fn load_or_default(variant: Variant) -> Self {
        let file = FileConfig::read_or_default(&utils::config_path());
        Self::from_sources(variant, file, |key| std::env::var(key).ok())
    }

    pub fn from_sources<F>(variant: Variant, file: FileConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_key = env("OPENAI_API_KEY").or(file.api_key);
        let endpoint = env("LLM_ENDPOINT")
            .or(file.endpoint)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let model = env("LLM_MODEL")
            .or(file.model)
            .unwrap_or_else(|| variant.default_model().to_string());
        let max_tokens = env("LLM_MAX_TOKENS")
            .and_then(|s| s.trim().parse::<u32>().ok())
            .or(file.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS);
        let temperature = env("LLM_TEMPERATURE")
            .and_then(|s| s.trim().parse::<f32>().ok())
            .or(file.temperature)
            .unwrap_or(DEFAULT_TEMPERATURE);
        let batch_size = match env("EVENT_BATCH_SIZE") {
            Some(raw) => parse_batch_size(&raw),
            None => match file.batch_size {
                Some(0) => None,
                Some(size) => Some(size),
                None => Some(DEFAULT_BATCH_SIZE),
            },
        };
        let audience = match env("EVENTS_AUDIENCE").map(|raw| raw.parse::<Audience>()) {
            Some(Ok(audience)) => audience,
            Some(Err(err)) => {
                warn!(error = %err, "ignoring EVENTS_AUDIENCE");
                file.audience.unwrap_or_default()
            }
            None => file.audience.unwrap_or_default(),
        };
        let server_addr = env("SERVER_ADDR")
            .or(file.server_addr)
            .unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string());
        let cors_origin = env("CORS_ORIGIN")
            .or(file.cors_origin)
            .unwrap_or_else(|| DEFAULT_CORS_ORIGIN.to_string());

        Self {
            variant,
            api_key,
            endpoint,
            model,
            max_tokens,
            temperature,
            batch_size,
            audience,
            server_addr,
            cors_origin,
            listing_timeout: Duration::from_secs(20),
            detail_timeout: Duration::from_secs(15),
            completion_timeout: Duration::from_secs(120),
        }
    }

    /// Fails when no usable credential is configured.
    pub fn completion_config(&self) -> Result<CompletionConfig, ConfigError> {
        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;
        Ok(CompletionConfig {
            endpoint: self.endpoint.clone(),
            api_key: api_key.to_string(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: self.completion_timeout,
        })
    }

    pub fn batch_policy(&self) -> BatchPolicy {
        BatchPolicy {
            required_fields: self.variant.required_fields(),
            blank_description_is_empty: self.variant.blank_description_is_empty(),
            max_size: self.batch_size,
        }
    }

    pub fn collect_options(&self, audience: Audience) -> CollectOptions {
        CollectOptions {
            audience,
            listing_timeout: self.listing_timeout,
            detail_timeout: self.detail_timeout,
            detail_delay: self.variant.detail_delay(),
        }
    }
}

fn parse_batch_size(raw: &str) -> Option<usize> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "none" | "all" | "0" => None,
        value => match value.parse::<usize>() {
            Ok(size) => Some(size),
            Err(_) => {
                warn!(value = raw, "invalid EVENT_BATCH_SIZE, using default");
                Some(DEFAULT_BATCH_SIZE)
            }
        },
    }
}
