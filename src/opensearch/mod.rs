//! OpenSearch k-NN client.
//!
//! Every operation is signed for the `es` service and fails the same way:
//! endpoint not configured, credentials unavailable, or a non-success HTTP
//! status carried in [`Error::Upstream`].

mod bulk;
pub mod schema;

pub use bulk::{bulk_body, parse_bulk_response, BulkReport};

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::aws::{endpoint_url, CredentialSource, Payload, SignedClient};
use crate::error::{Error, Result};
use crate::search::EMBEDDING_DIM;
use crate::types::{IndexDocument, RawHit};

/// Nearest-neighbor lookup over stored documents.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top-`k` hits for `embedding`, in the service's relevance order.
    async fn knn_search(&self, embedding: &[f32], k: usize) -> Result<Vec<RawHit>>;
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: HitsEnvelope,
}

#[derive(Debug, Default, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<RawHit>,
}

/// Stats and mapping of the index. A part that could not be fetched holds
/// the string `Error: <body>`.
#[derive(Debug, Clone)]
pub struct IndexInfo {
    pub index_name: String,
    pub stats: JsonValue,
    pub mapping: JsonValue,
}

impl IndexInfo {
    fn totals(&self) -> &JsonValue {
        &self.stats["indices"][self.index_name.as_str()]["total"]
    }

    /// `None` when the stats call failed or the index does not exist.
    pub fn doc_count(&self) -> Option<u64> {
        self.totals()["docs"]["count"].as_u64()
    }

    pub fn store_size_bytes(&self) -> Option<u64> {
        self.totals()["store"]["size_in_bytes"].as_u64()
    }
}

/// Subset of `_cluster/health`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterHealth {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub number_of_nodes: u64,
}

/// Signed client for one OpenSearch domain and index.
#[derive(Debug, Clone)]
pub struct OpenSearchClient {
    client: SignedClient,
    base_url: Option<String>,
    index_name: String,
}

impl OpenSearchClient {
    pub fn new(
        http: reqwest::Client,
        credentials: CredentialSource,
        region: &str,
        endpoint: Option<&str>,
        index_name: impl Into<String>,
    ) -> Self {
        Self {
            client: SignedClient::new(http, credentials, region, "es", "OpenSearch"),
            base_url: endpoint.map(endpoint_url),
            index_name: index_name.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn base(&self) -> Result<&str> {
        self.base_url
            .as_deref()
            .ok_or(Error::NotConfigured("OpenSearch"))
    }

    fn index_url(&self, suffix: &str) -> Result<String> {
        Ok(format!(
            "{}/{}{}",
            self.base()?,
            urlencoding::encode(&self.index_name),
            suffix
        ))
    }

    /// Create the index with k-NN settings and the document mapping.
    pub async fn create_index(&self) -> Result<()> {
        let url = self.index_url("")?;
        let body = schema::index_body(EMBEDDING_DIM);
        self.client
            .send_checked(Method::PUT, &url, Some(Payload::json(&body)?))
            .await?;
        info!(index = %self.index_name, "Index created");
        Ok(())
    }

    /// Index one document. Without an explicit id the content-derived
    /// [`IndexDocument::document_id`] is used. Returns the id written.
    pub async fn add_document(&self, document: &IndexDocument, id: Option<&str>) -> Result<String> {
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| document.document_id());
        let url = self.index_url(&format!("/_doc/{}", urlencoding::encode(&id)))?;
        self.client
            .send_checked(Method::PUT, &url, Some(Payload::json(document)?))
            .await?;
        debug!(index = %self.index_name, id = %id, "Document indexed");
        Ok(id)
    }

    /// Upload documents through `_bulk`.
    pub async fn bulk_add(&self, documents: &[IndexDocument]) -> Result<BulkReport> {
        let url = format!("{}/_bulk", self.base()?);
        if documents.is_empty() {
            return Ok(BulkReport {
                submitted: 0,
                failed: 0,
            });
        }
        let body = bulk_body(&self.index_name, documents)?;
        let text = self
            .client
            .send_checked(Method::POST, &url, Some(Payload::ndjson(body)))
            .await?;
        let report = parse_bulk_response(&text, documents.len())?;
        if report.is_success() {
            info!(documents = report.submitted, "Bulk upload completed");
        } else {
            warn!(
                documents = report.submitted,
                errors = report.failed,
                "Bulk upload completed with errors"
            );
        }
        Ok(report)
    }

    /// Fetch `_stats` and `_mapping` for the index.
    pub async fn index_info(&self) -> Result<IndexInfo> {
        let stats = self.get_or_error_string(&self.index_url("/_stats")?).await?;
        let mapping = self.get_or_error_string(&self.index_url("/_mapping")?).await?;
        Ok(IndexInfo {
            index_name: self.index_name.clone(),
            stats,
            mapping,
        })
    }

    async fn get_or_error_string(&self, url: &str) -> Result<JsonValue> {
        let response = self.client.send(Method::GET, url, None).await?;
        let ok = response.status().is_success();
        let text = response.text().await?;
        if ok {
            Ok(serde_json::from_str(&text)?)
        } else {
            Ok(JsonValue::String(format!("Error: {text}")))
        }
    }

    pub async fn cluster_health(&self) -> Result<ClusterHealth> {
        let url = format!("{}/_cluster/health", self.base()?);
        let text = self.client.send_checked(Method::GET, &url, None).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl VectorIndex for OpenSearchClient {
    async fn knn_search(&self, embedding: &[f32], k: usize) -> Result<Vec<RawHit>> {
        let url = self.index_url("/_search")?;
        let body = schema::knn_query(embedding, k);
        let text = self
            .client
            .send_checked(Method::POST, &url, Some(Payload::json(&body)?))
            .await?;
        let parsed: SearchResponse = serde_json::from_str(&text)?;
        debug!(hits = parsed.hits.hits.len(), k, "k-NN search finished");
        Ok(parsed.hits.hits)
    }
}
