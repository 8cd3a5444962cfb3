//! Push notifications to WebSocket clients through the API Gateway
//! management API.
//!
//! Delivery is best effort: [`NotificationSender::send`] never reports a
//! failure to its caller.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aws::{endpoint_url, CredentialSource, Payload, SignedClient};
use crate::error::{Error, Result};
use crate::types::SearchHit;

/// Progress marker carried by background search notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Processing,
    NoResults,
    SearchComplete,
    SearchError,
}

/// JSON message pushed to a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NotificationStatus>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<SearchHit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_results: Option<usize>,
}

impl NotificationPayload {
    fn with_status(status: NotificationStatus, query: &str, message: String) -> Self {
        Self {
            status: Some(status),
            message,
            results: None,
            query: Some(query.to_string()),
            total_results: None,
        }
    }

    pub fn processing(query: &str) -> Self {
        Self::with_status(
            NotificationStatus::Processing,
            query,
            format!("Processing semantic search for: {query}"),
        )
    }

    /// Carries an empty `results` list so clients can render it directly.
    pub fn no_results(query: &str) -> Self {
        Self {
            results: Some(Vec::new()),
            ..Self::with_status(
                NotificationStatus::NoResults,
                query,
                format!("No results found for '{query}'. Try rephrasing your query."),
            )
        }
    }

    pub fn search_complete(query: &str, message: String, results: Vec<SearchHit>) -> Self {
        let total = results.len();
        Self {
            results: Some(results),
            total_results: Some(total),
            ..Self::with_status(NotificationStatus::SearchComplete, query, message)
        }
    }

    pub fn search_error(query: &str, error: &Error) -> Self {
        Self {
            results: Some(Vec::new()),
            ..Self::with_status(
                NotificationStatus::SearchError,
                query,
                format!("Sorry, I encountered an error while searching: {error}"),
            )
        }
    }

    /// Results pushed alongside a synchronous `/search` response.
    pub fn search_results(query: &str, results: Vec<SearchHit>) -> Self {
        Self {
            status: None,
            message: format!("Search results for: {query}"),
            results: Some(results),
            query: Some(query.to_string()),
            total_results: None,
        }
    }

    fn status_label(&self) -> &'static str {
        match self.status {
            Some(NotificationStatus::Processing) => "processing",
            Some(NotificationStatus::NoResults) => "no_results",
            Some(NotificationStatus::SearchComplete) => "search_complete",
            Some(NotificationStatus::SearchError) => "search_error",
            None => "results",
        }
    }
}

/// Delivers a payload to one connection.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Fails with [`Error::ConnectionGone`] when the destination no longer
    /// exists.
    async fn post(&self, connection_id: &str, payload: &NotificationPayload) -> Result<()>;
}

/// `POST @connections/{id}` against an API Gateway management endpoint.
#[derive(Debug, Clone)]
pub struct ApiGatewayNotifier {
    client: SignedClient,
    base_url: String,
}

impl ApiGatewayNotifier {
    pub fn new(
        http: reqwest::Client,
        credentials: CredentialSource,
        region: &str,
        endpoint: &str,
    ) -> Self {
        Self {
            client: SignedClient::new(http, credentials, region, "execute-api", "API Gateway"),
            base_url: endpoint_url(endpoint),
        }
    }

    fn connection_url(&self, connection_id: &str) -> String {
        format!(
            "{}/@connections/{}",
            self.base_url,
            urlencoding::encode(connection_id)
        )
    }
}

#[async_trait]
impl Notifier for ApiGatewayNotifier {
    async fn post(&self, connection_id: &str, payload: &NotificationPayload) -> Result<()> {
        let url = self.connection_url(connection_id);
        let response = self
            .client
            .send(Method::POST, &url, Some(Payload::json(payload)?))
            .await?;
        let status = response.status();
        if status == StatusCode::GONE {
            return Err(Error::ConnectionGone(connection_id.to_string()));
        }
        if !status.is_success() {
            return Err(Error::Upstream {
                service: self.client.label(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// Best-effort sender. Unconfigured senders log and drop every message.
#[derive(Clone, Default)]
pub struct NotificationSender {
    inner: Option<Arc<dyn Notifier>>,
}

impl fmt::Debug for NotificationSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationSender")
            .field("configured", &self.is_configured())
            .finish()
    }
}

impl NotificationSender {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Some(notifier),
        }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }

    pub async fn send(&self, connection_id: &str, payload: &NotificationPayload) {
        let status = payload.status_label();
        let Some(notifier) = &self.inner else {
            warn!(connection_id, status, "WebSocket endpoint not configured, dropping notification");
            counter!("notifications_total", "outcome" => "skipped").increment(1);
            return;
        };

        match notifier.post(connection_id, payload).await {
            Ok(()) => {
                debug!(connection_id, status, "Notification delivered");
                counter!("notifications_total", "outcome" => "sent").increment(1);
            }
            Err(Error::ConnectionGone(_)) => {
                info!(connection_id, "Connection is gone, notification dropped");
                counter!("notifications_total", "outcome" => "gone").increment(1);
            }
            Err(e) => {
                warn!(connection_id, status, "Failed to send notification: {}", e);
                counter!("notifications_total", "outcome" => "failed").increment(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct GoneNotifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for GoneNotifier {
        async fn post(&self, connection_id: &str, _payload: &NotificationPayload) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::ConnectionGone(connection_id.to_string()))
        }
    }

    #[tokio::test]
    async fn test_gone_connection_is_swallowed() {
        let notifier = Arc::new(GoneNotifier {
            calls: AtomicUsize::new(0),
        });
        let sender = NotificationSender::new(notifier.clone());
        sender
            .send("abc123", &NotificationPayload::processing("hello"))
            .await;
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_sender_returns_quietly() {
        let sender = NotificationSender::disabled();
        assert!(!sender.is_configured());
        sender
            .send("abc123", &NotificationPayload::no_results("hello"))
            .await;
    }

    #[test]
    fn test_payload_serialization() {
        let value = serde_json::to_value(NotificationPayload::no_results("hello")).unwrap();
        assert_eq!(value["status"], "no_results");
        assert_eq!(
            value["message"],
            "No results found for 'hello'. Try rephrasing your query."
        );
        assert_eq!(value["results"], serde_json::json!([]));
        assert_eq!(value["query"], "hello");
        assert!(value.get("total_results").is_none());

        let value = serde_json::to_value(NotificationPayload::search_results("hi", vec![])).unwrap();
        assert!(value.get("status").is_none());
        assert_eq!(value["message"], "Search results for: hi");
        assert_eq!(value["query"], "hi");
    }

    #[test]
    fn test_every_status_payload_carries_query() {
        let error = Error::MissingEmbedding("titan".to_string());
        let payloads = [
            NotificationPayload::processing("shoes"),
            NotificationPayload::no_results("shoes"),
            NotificationPayload::search_complete("shoes", "done".to_string(), vec![]),
            NotificationPayload::search_error("shoes", &error),
        ];
        for payload in payloads {
            let value = serde_json::to_value(&payload).unwrap();
            assert_eq!(value["query"], "shoes", "{value}");
        }
    }

    #[test]
    fn test_error_payload_has_empty_results() {
        let error = Error::MissingEmbedding("titan".to_string());
        let value =
            serde_json::to_value(NotificationPayload::search_error("shoes", &error)).unwrap();
        assert_eq!(value["status"], "search_error");
        assert_eq!(value["results"], serde_json::json!([]));
        assert!(value["message"]
            .as_str()
            .unwrap()
            .starts_with("Sorry, I encountered an error while searching: "));

        let value = serde_json::to_value(NotificationPayload::processing("shoes")).unwrap();
        assert!(value.get("results").is_none());
    }

    #[test]
    fn test_complete_payload_counts_results() {
        let payload = NotificationPayload::search_complete("q", "done".to_string(), vec![]);
        assert_eq!(payload.status, Some(NotificationStatus::SearchComplete));
        assert_eq!(payload.total_results, Some(0));
    }

    #[test]
    fn test_connection_url_encodes_id() {
        let notifier = ApiGatewayNotifier::new(
            reqwest::Client::new(),
            CredentialSource::Environment,
            "us-east-1",
            "https://abc.execute-api.us-east-1.amazonaws.com/production/",
        );
        assert_eq!(
            notifier.connection_url("Lx9b=a"),
            "https://abc.execute-api.us-east-1.amazonaws.com/production/@connections/Lx9b%3Da"
        );
    }
}
