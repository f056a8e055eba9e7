//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `CAPTIONER_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `CAPTIONER_` override YAML values
//! 3. **Azure variables** - `AZURE_VISION_ENDPOINT`, `AZURE_VISION_KEY`, `AZURE_OPENAI_ENDPOINT`,
//!    `AZURE_OPENAI_KEY` and `AZURE_OPENAI_DEPLOYMENT` fill the service connection settings
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `CAPTIONER_BATCH__MAX_CONCURRENCY=8` sets the `batch.max_concurrency` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use captioner::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Example
//!
//! ```yaml
//! port: 8080
//! vision:
//!   endpoint: https://my-vision.cognitiveservices.azure.com
//!   api_key: <key>
//!   timeout: 30s
//! chat:
//!   endpoint: https://my-openai.openai.azure.com
//!   api_key: <key>
//!   deployment: gpt-35-turbo-alttext-service
//! batch:
//!   max_concurrency: 4
//! ```
//!
//! The vision and chat connection settings are required: a missing endpoint or key fails
//! [`Config::load`] before any request is served.

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "CAPTIONER_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have defaults except the service credentials, which [`Config::validate`] requires.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Maximum accepted request body for an upload batch, in bytes
    pub max_upload_size: usize,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
    /// Cross-origin settings for browser uploads
    pub cors: CorsConfig,
    /// Image analysis service connection
    pub vision: VisionConfig,
    /// Chat completion service connection and sampling settings
    pub chat: ChatConfig,
    /// Per-request fan-out settings
    pub batch: BatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_upload_size: 64 * 1024 * 1024,
            enable_otel_export: false,
            cors: CorsConfig::default(),
            vision: VisionConfig::default(),
            chat: ChatConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

/// Debug stand-in for a credential: shows whether it is set, never its value.
fn redacted(secret: Option<&str>) -> Option<&'static str> {
    secret.map(|_| "<redacted>")
}

/// Azure AI Vision (Image Analysis 4.0) connection.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct VisionConfig {
    /// Resource endpoint, e.g. `https://<resource>.cognitiveservices.azure.com`
    pub endpoint: Option<Url>,
    /// Subscription key sent as `Ocp-Apim-Subscription-Key`
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Image Analysis REST API version
    pub api_version: String,
    /// Upper bound for a single analysis call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl fmt::Debug for VisionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &redacted(self.api_key.as_deref()))
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_version: "2023-10-01".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Which wire dialect the chat endpoint speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatProvider {
    /// Azure OpenAI: deployment in the path, `api-key` header, `api-version` query
    #[default]
    Azure,
    /// OpenAI-compatible: `{endpoint}/chat/completions`, bearer token, deployment sent as `model`
    OpenAi,
}

/// Chat completion service connection and generation settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatConfig {
    pub provider: ChatProvider,
    /// Resource endpoint, e.g. `https://<resource>.openai.azure.com`
    pub endpoint: Option<Url>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Deployment name (Azure) or model identifier (OpenAI-compatible)
    pub deployment: String,
    /// Azure OpenAI REST API version (ignored by the OpenAI-compatible provider)
    pub api_version: String,
    /// Upper bound for a single completion call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Maximum tokens the model may generate for one caption
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("api_key", &redacted(self.api_key.as_deref()))
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: ChatProvider::default(),
            endpoint: None,
            api_key: None,
            deployment: "gpt-35-turbo-alttext-service".to_string(),
            api_version: "2024-02-01".to_string(),
            timeout: Duration::from_secs(60),
            max_tokens: 200,
            temperature: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    /// How many images of one request are captioned at the same time
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_concurrency: 4 }
    }
}

/// CORS configuration for the upload endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            max_age: None,
        }
    }
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard", serialize_with = "serialize_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn serialize_wildcard<S>(serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str("*")
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("CAPTIONER_").ignore(&["config"]).split("__"))
            // Conventional Azure variable names, mapped onto the nested keys
            .merge(
                Env::raw()
                    .only(&[
                        "AZURE_VISION_ENDPOINT",
                        "AZURE_VISION_KEY",
                        "AZURE_OPENAI_ENDPOINT",
                        "AZURE_OPENAI_KEY",
                        "AZURE_OPENAI_DEPLOYMENT",
                    ])
                    .map(|key| match key.as_str().to_ascii_lowercase().as_str() {
                        "azure_vision_endpoint" => "vision.endpoint".into(),
                        "azure_vision_key" => "vision.api_key".into(),
                        "azure_openai_endpoint" => "chat.endpoint".into(),
                        "azure_openai_key" => "chat.api_key".into(),
                        _ => "chat.deployment".into(),
                    }),
            )
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.vision.endpoint.is_none() || is_blank(self.vision.api_key.as_deref()) {
            return Err(Error::Config {
                message: "Missing vision endpoint or subscription key. Set vision.endpoint and vision.api_key \
                          (or AZURE_VISION_ENDPOINT / AZURE_VISION_KEY)."
                    .to_string(),
            });
        }

        if self.chat.endpoint.is_none() || is_blank(self.chat.api_key.as_deref()) {
            return Err(Error::Config {
                message: "Missing chat endpoint or key. Set chat.endpoint and chat.api_key \
                          (or AZURE_OPENAI_ENDPOINT / AZURE_OPENAI_KEY)."
                    .to_string(),
            });
        }

        if self.chat.deployment.trim().is_empty() {
            return Err(Error::Config {
                message: "chat.deployment cannot be empty".to_string(),
            });
        }

        if !(0.0..=2.0).contains(&self.chat.temperature) {
            return Err(Error::Config {
                message: format!("chat.temperature must be between 0 and 2, got {}", self.chat.temperature),
            });
        }

        if self.chat.max_tokens == 0 {
            return Err(Error::Config {
                message: "chat.max_tokens must be at least 1".to_string(),
            });
        }

        if self.vision.timeout.is_zero() || self.chat.timeout.is_zero() {
            return Err(Error::Config {
                message: "Service timeouts must be greater than zero".to_string(),
            });
        }

        if self.batch.max_concurrency == 0 {
            return Err(Error::Config {
                message: "batch.max_concurrency must be at least 1".to_string(),
            });
        }

        if self.cors.allowed_origins.is_empty() {
            return Err(Error::Config {
                message: "CORS allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            });
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}
