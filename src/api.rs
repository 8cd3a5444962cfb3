//! HTTP API.
//!
//! | Method | Path              | Purpose                                   |
//! |--------|-------------------|-------------------------------------------|
//! | GET    | `/`               | Liveness text                             |
//! | POST   | `/search`         | Synchronous semantic search               |
//! | POST   | `/process-search` | Queue a search, results pushed over WS    |
//! | GET    | `/health`         | Configuration summary, no upstream calls  |
//! | GET    | `/tasks/{id}`     | Status of a queued search                 |
//! | POST   | `/summarize`      | Model summary of the top hits             |

use std::future::Future;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{BackendConfig, ServerConfig, SERVICE_NAME};
use crate::error::{Error, Result};
use crate::notify::{NotificationPayload, NotificationSender};
use crate::search::SearchPipeline;
use crate::summarize::Summarizer;
use crate::tasks::{TaskPool, TaskRecord};
use crate::types::SearchHit;

pub const HELLO: &str = "Hello, Semantic Search Backend!";
pub const PROCESSING_STARTED: &str =
    "Semantic search processing started. Results will be sent via WebSocket.";

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub listen_address: String,
    pub cors_enabled: bool,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for ApiConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            listen_address: server.listen_address.clone(),
            cors_enabled: server.cors_enabled,
            cors_origins: server.cors_origins.clone(),
        }
    }
}

/// Configuration summary reported by `/health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSummary {
    pub opensearch_configured: bool,
    pub websocket_configured: bool,
    pub bedrock_model: String,
    pub aws_region: String,
    pub index_name: String,
}

impl From<&BackendConfig> for ConfigurationSummary {
    fn from(config: &BackendConfig) -> Self {
        Self {
            opensearch_configured: config.opensearch_configured(),
            websocket_configured: config.websocket_configured(),
            bedrock_model: config.bedrock.embedding_model_id.clone(),
            aws_region: config.aws.region.clone(),
            index_name: config.opensearch.index_name.clone(),
        }
    }
}

/// Shared handler state. Clients are built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: SearchPipeline,
    pub notifier: NotificationSender,
    pub tasks: Arc<TaskPool>,
    pub summarizer: Summarizer,
    pub summary_k: usize,
    pub configuration: ConfigurationSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

fn bad_request(message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, message)
}

fn internal_error(message: String) -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
}

/// Present, non-empty value or `None`. Whitespace counts as a value.
fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub total_results: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessSearchResponse {
    pub message: String,
    pub query: String,
    pub connection_id: String,
    pub task_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub configuration: ConfigurationSummary,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummarizeRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub k: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummarizeResponse {
    pub query: String,
    pub summary: String,
}

async fn index() -> &'static str {
    HELLO
}

async fn search(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SearchRequest>, JsonRejection>,
) -> Response {
    counter!("api_requests_total", "route" => "search").increment(1);
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Rejected /search body: {}", rejection);
            return bad_request("Missing query in request body.");
        }
    };
    let Some(query) = required(request.query) else {
        return bad_request("Missing query in request body.");
    };

    let results = match state.pipeline.search(&query).await {
        Ok(results) => results,
        Err(e) => {
            error!(query = %query, "Search failed: {}", e);
            return internal_error(format!("Search failed: {e}"));
        }
    };

    if let Some(connection_id) = required(request.connection_id) {
        if state.notifier.is_configured() {
            state
                .notifier
                .send(
                    &connection_id,
                    &NotificationPayload::search_results(&query, results.clone()),
                )
                .await;
        }
    }

    let total_results = results.len();
    Json(SearchResponse {
        query,
        results,
        total_results,
    })
    .into_response()
}

async fn process_search(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SearchRequest>, JsonRejection>,
) -> Response {
    counter!("api_requests_total", "route" => "process_search").increment(1);
    const MISSING: &str = "Missing query or connection_id in request body.";

    let Ok(Json(request)) = payload else {
        return bad_request(MISSING);
    };
    let (Some(query), Some(connection_id)) =
        (required(request.query), required(request.connection_id))
    else {
        return bad_request(MISSING);
    };

    match state.tasks.submit(&query, &connection_id).await {
        Ok(task_id) => {
            info!(task_id = %task_id, connection_id = %connection_id, "Search queued");
            (
                StatusCode::ACCEPTED,
                Json(ProcessSearchResponse {
                    message: PROCESSING_STARTED.to_string(),
                    query,
                    connection_id,
                    task_id,
                }),
            )
                .into_response()
        }
        Err(e) => internal_error(format!("Failed to start search: {e}")),
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        configuration: state.configuration.clone(),
    })
}

async fn task_status(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let record: Option<TaskRecord> = match Uuid::parse_str(&id) {
        Ok(id) => state.tasks.registry().get(id).await,
        Err(_) => None,
    };
    match record {
        Some(record) => Json(record).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Task not found"),
    }
}

async fn summarize(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SummarizeRequest>, JsonRejection>,
) -> Response {
    counter!("api_requests_total", "route" => "summarize").increment(1);
    let Ok(Json(request)) = payload else {
        return bad_request("Missing query in request body.");
    };
    let Some(query) = required(request.query) else {
        return bad_request("Missing query in request body.");
    };
    let k = request.k.filter(|k| *k > 0).unwrap_or(state.summary_k);

    match state.summarizer.summarize(&query, k).await {
        Ok(summary) => Json(SummarizeResponse { query, summary }).into_response(),
        Err(e) => {
            error!(query = %query, "Summarization failed: {}", e);
            internal_error(format!("Summarization failed: {e}"))
        }
    }
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let origins = if config.cors_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static("x-amz-date"),
            AUTHORIZATION,
            HeaderName::from_static("x-api-key"),
            HeaderName::from_static("x-amz-security-token"),
        ])
}

/// HTTP API server.
pub struct ApiServer {
    config: ApiConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ApiConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/", get(index))
            .route("/search", post(search))
            .route("/process-search", post(process_search))
            .route("/health", get(health))
            .route("/tasks/{id}", get(task_status))
            .route("/summarize", post(summarize))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.cors_enabled {
            router.layer(cors_layer(&self.config))
        } else {
            router
        }
    }

    /// Serve until `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(&self.config.listen_address)
            .await
            .map_err(|e| Error::Api(format!("Failed to bind {}: {}", self.config.listen_address, e)))?;
        info!("API server listening on {}", self.config.listen_address);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Api(format!("Server error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_rejects_missing_or_empty() {
        assert_eq!(required(None), None);
        assert_eq!(required(Some(String::new())), None);
        assert_eq!(required(Some("   ".to_string())).as_deref(), Some("   "));
        assert_eq!(required(Some("hello".to_string())).as_deref(), Some("hello"));
    }

    #[test]
    fn test_summary_reflects_config() {
        let mut config = BackendConfig::default();
        config.opensearch.endpoint = Some("search.example.com".to_string());
        let summary = ConfigurationSummary::from(&config);
        assert!(summary.opensearch_configured);
        assert!(!summary.websocket_configured);
        assert_eq!(summary.bedrock_model, "amazon.titan-embed-text-v1");
        assert_eq!(summary.index_name, "semantic-search-index");
    }

    #[test]
    fn test_api_config_from_server_section() {
        let api = ApiConfig::default();
        assert_eq!(api.listen_address, "0.0.0.0:8080");
        assert!(api.cors_enabled);
    }
}
