//! Semantic search backend.
//!
//! Embeds queries with Amazon Bedrock, finds nearest neighbors in an
//! OpenSearch k-NN index, and returns the matches over HTTP or pushes them
//! to WebSocket clients through the API Gateway management API.
//!
//! # Modules
//!
//! - [`aws`] - credentials and SigV4 request signing
//! - [`embedding`] - query embedding via Bedrock
//! - [`opensearch`] - k-NN index client
//! - [`formatter`] - raw hits to [`SearchHit`]
//! - [`notify`] - WebSocket push notifications
//! - [`search`] - query pipeline and background notify flow
//! - [`summarize`] - retrieval-augmented summaries
//! - [`tasks`] - background worker pool with status tracking
//! - [`api`] - HTTP handlers

pub mod api;
pub mod aws;
pub mod bedrock;
pub mod config;
pub mod embedding;
pub mod error;
pub mod formatter;
pub mod notify;
pub mod opensearch;
pub mod search;
pub mod summarize;
pub mod tasks;
pub mod types;

pub use api::{ApiConfig, ApiServer, AppState, ConfigurationSummary};
pub use aws::{AwsCredentials, CredentialSource};
pub use bedrock::{BedrockControl, BedrockRuntime};
pub use config::BackendConfig;
pub use embedding::{BedrockEmbedder, Embedder};
pub use error::{Error, Result};
pub use notify::{ApiGatewayNotifier, NotificationPayload, NotificationSender, Notifier};
pub use opensearch::{BulkReport, OpenSearchClient, VectorIndex};
pub use search::{SearchNotifyFlow, SearchPipeline};
pub use summarize::{BedrockTextGenerator, RequestStyle, Summarizer, TextGenerator};
pub use tasks::{TaskPool, TaskRegistry};
pub use types::{IndexDocument, RawHit, SearchHit};
