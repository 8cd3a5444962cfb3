//! Backend configuration.
//!
//! Values come from three layers, later layers winning:
//! built-in defaults, an optional TOML file, then environment variables
//! (`OPENSEARCH_ENDPOINT`, `WEBSOCKET_API_ENDPOINT`, `MODEL_ID`, `AWS_REGION`,
//! `INDEX_NAME`, `LLM_MODEL_ID`, `LLM_REQUEST_STYLE`).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::search::DEFAULT_MODEL;
use crate::summarize::RequestStyle;

/// Service name reported by the health endpoint.
pub const SERVICE_NAME: &str = "semantic-search-backend";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub opensearch: OpenSearchConfig,
    #[serde(default)]
    pub bedrock: BedrockConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub tasks: TaskConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// HTTP API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the API binds to.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Attach CORS headers to responses.
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed origins; empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
        }
    }
}

/// OpenSearch domain settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSearchConfig {
    /// Domain endpoint, with or without scheme. Unset disables search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_index_name")]
    pub index_name: String,
    /// Number of neighbors requested by `/search` and `/process-search`.
    #[serde(default = "default_search_k")]
    pub search_k: usize,
}

impl Default for OpenSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            index_name: default_index_name(),
            search_k: default_search_k(),
        }
    }
}

/// Bedrock model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedrockConfig {
    #[serde(default = "default_embedding_model")]
    pub embedding_model_id: String,
    #[serde(default = "default_text_model")]
    pub text_model_id: String,
    /// Body shape used for the text model.
    #[serde(default)]
    pub request_style: RequestStyle,
    /// Override for the runtime endpoint (VPC endpoints, local testing).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_endpoint: Option<String>,
    /// Override for the control-plane endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_endpoint: Option<String>,
    /// Neighbors fed into the summarization prompt.
    #[serde(default = "default_summary_k")]
    pub summary_k: usize,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            embedding_model_id: default_embedding_model(),
            text_model_id: default_text_model(),
            request_style: RequestStyle::default(),
            runtime_endpoint: None,
            control_endpoint: None,
            summary_k: default_summary_k(),
        }
    }
}

impl BedrockConfig {
    /// Runtime endpoint, defaulting to the regional public endpoint.
    pub fn runtime_url(&self, region: &str) -> String {
        self.runtime_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://bedrock-runtime.{region}.amazonaws.com"))
    }

    /// Control-plane endpoint, defaulting to the regional public endpoint.
    pub fn control_url(&self, region: &str) -> String {
        self.control_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://bedrock.{region}.amazonaws.com"))
    }
}

/// API Gateway WebSocket management settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// Management endpoint, e.g. `https://abc.execute-api.us-east-1.amazonaws.com/production`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Background worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Task records kept for status lookups.
    #[serde(default = "default_max_retained")]
    pub max_retained: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_retained: default_max_retained(),
        }
    }
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_address")]
    pub listen_address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_address: default_metrics_address(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_index_name() -> String {
    "semantic-search-index".to_string()
}

fn default_search_k() -> usize {
    10
}

fn default_embedding_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_text_model() -> String {
    "amazon.titan-text-lite-v1".to_string()
}

fn default_summary_k() -> usize {
    5
}

fn default_workers() -> usize {
    4
}

fn default_max_retained() -> usize {
    1024
}

fn default_metrics_address() -> String {
    "0.0.0.0:9100".to_string()
}

impl BackendConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: BackendConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Write configuration as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Apply process environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Empty values are ignored so that `OPENSEARCH_ENDPOINT=` leaves the
    /// feature unconfigured instead of pointing at an empty host.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = get("OPENSEARCH_ENDPOINT") {
            self.opensearch.endpoint = Some(endpoint);
        }
        if let Some(endpoint) = get("WEBSOCKET_API_ENDPOINT") {
            self.websocket.endpoint = Some(endpoint);
        }
        if let Some(model) = get("MODEL_ID") {
            self.bedrock.embedding_model_id = model;
        }
        if let Some(region) = get("AWS_REGION") {
            self.aws.region = region;
        }
        if let Some(index) = get("INDEX_NAME") {
            self.opensearch.index_name = index;
        }
        if let Some(model) = get("LLM_MODEL_ID") {
            self.bedrock.text_model_id = model;
        }
        if let Some(style) = get("LLM_REQUEST_STYLE") {
            self.bedrock.request_style = style.parse()?;
        }
        Ok(())
    }

    /// Reject values that would only fail later at request time.
    pub fn validate(&self) -> Result<()> {
        if self.opensearch.index_name.trim().is_empty() {
            return Err(Error::Config("index_name must not be empty".to_string()));
        }
        if self.opensearch.search_k == 0 {
            return Err(Error::Config("search_k must be at least 1".to_string()));
        }
        if self.tasks.workers == 0 {
            return Err(Error::Config("tasks.workers must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn opensearch_configured(&self) -> bool {
        self.opensearch.endpoint.is_some()
    }

    pub fn websocket_configured(&self) -> bool {
        self.websocket.endpoint.is_some()
    }
}
