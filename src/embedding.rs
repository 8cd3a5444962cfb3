//! Query embedding via Bedrock Titan text embeddings.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::bedrock::BedrockRuntime;
use crate::error::{Error, Result};
use crate::types::Embedding;

/// Sentence used by [`BedrockEmbedder::test_connection`].
pub const CONNECTION_TEST_TEXT: &str = "This is a test sentence for embedding.";

/// Turns text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier used for embeddings.
    fn model_id(&self) -> &str;

    /// Embed one text. Fails when the call fails or no vector comes back.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed texts one by one. Failed items become `None`; the batch
    /// always runs to the end.
    async fn embed_batch(&self, texts: &[String]) -> Vec<Option<Embedding>> {
        let total = texts.len();
        let mut embeddings = Vec::with_capacity(total);
        for (index, text) in texts.iter().enumerate() {
            match self.embed(text).await {
                Ok(embedding) => {
                    debug!("Processed embedding {}/{}", index + 1, total);
                    embeddings.push(Some(embedding));
                }
                Err(e) => {
                    warn!("Failed to get embedding for text {}: {}", index + 1, e);
                    embeddings.push(None);
                }
            }
        }
        embeddings
    }
}

#[derive(Debug, Deserialize)]
struct TitanEmbeddingResponse {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
    #[serde(default, rename = "inputTextTokenCount")]
    input_text_token_count: Option<u64>,
}

/// Outcome of [`BedrockEmbedder::test_connection`].
#[derive(Debug, Clone)]
pub struct ConnectionReport {
    pub model_id: String,
    pub region: String,
    pub dimensions: usize,
}

/// Bedrock-backed [`Embedder`].
#[derive(Debug, Clone)]
pub struct BedrockEmbedder {
    runtime: BedrockRuntime,
    model_id: String,
}

impl BedrockEmbedder {
    pub fn new(runtime: BedrockRuntime, model_id: impl Into<String>) -> Self {
        Self {
            runtime,
            model_id: model_id.into(),
        }
    }

    /// Embed a fixed sentence and report the vector size.
    pub async fn test_connection(&self) -> Result<ConnectionReport> {
        let embedding = self.embed(CONNECTION_TEST_TEXT).await?;
        Ok(ConnectionReport {
            model_id: self.model_id.clone(),
            region: self.runtime.region().to_string(),
            dimensions: embedding.len(),
        })
    }
}

#[async_trait]
impl Embedder for BedrockEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let response = self
            .runtime
            .invoke_model(&self.model_id, &json!({ "inputText": text }))
            .await?;
        let parsed: TitanEmbeddingResponse = serde_json::from_value(response)?;
        match parsed.embedding {
            Some(embedding) if !embedding.is_empty() => {
                debug!(
                    dimensions = embedding.len(),
                    tokens = parsed.input_text_token_count,
                    "Generated embedding"
                );
                Ok(embedding)
            }
            _ => Err(Error::MissingEmbedding(self.model_id.clone())),
        }
    }
}
