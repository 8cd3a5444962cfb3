//! Bedrock runtime and control-plane clients.

use reqwest::Method;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::aws::{endpoint_url, CredentialSource, Payload, SignedClient};
use crate::error::Result;

/// SigV4 signing name shared by the runtime and control plane.
const SIGNING_NAME: &str = "bedrock";

/// `InvokeModel` client.
#[derive(Debug, Clone)]
pub struct BedrockRuntime {
    client: SignedClient,
    base_url: String,
}

impl BedrockRuntime {
    pub fn new(
        http: reqwest::Client,
        credentials: CredentialSource,
        region: &str,
        endpoint: &str,
    ) -> Self {
        Self {
            client: SignedClient::new(http, credentials, region, SIGNING_NAME, "Bedrock"),
            base_url: endpoint_url(endpoint),
        }
    }

    pub fn region(&self) -> &str {
        self.client.region()
    }

    /// Invoke `model_id` with a JSON body and return the JSON response.
    pub async fn invoke_model(&self, model_id: &str, body: &JsonValue) -> Result<JsonValue> {
        let url = format!(
            "{}/model/{}/invoke",
            self.base_url,
            urlencoding::encode(model_id)
        );
        debug!(model_id, "Invoking Bedrock model");
        let text = self
            .client
            .send_checked(Method::POST, &url, Some(Payload::json(body)?))
            .await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Foundation model entry from `ListFoundationModels`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundationModel {
    pub model_id: String,
    #[serde(default)]
    pub model_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    model_summaries: Vec<FoundationModel>,
}

/// Control-plane client used for model discovery.
#[derive(Debug, Clone)]
pub struct BedrockControl {
    client: SignedClient,
    base_url: String,
}

impl BedrockControl {
    pub fn new(
        http: reqwest::Client,
        credentials: CredentialSource,
        region: &str,
        endpoint: &str,
    ) -> Self {
        Self {
            client: SignedClient::new(http, credentials, region, SIGNING_NAME, "Bedrock"),
            base_url: endpoint_url(endpoint),
        }
    }

    pub async fn list_foundation_models(&self) -> Result<Vec<FoundationModel>> {
        let url = format!("{}/foundation-models", self.base_url);
        let text = self.client.send_checked(Method::GET, &url, None).await?;
        let parsed: ListModelsResponse = serde_json::from_str(&text)?;
        Ok(parsed.model_summaries)
    }

    /// Foundation models whose id mentions `embed`.
    pub async fn list_embedding_models(&self) -> Result<Vec<FoundationModel>> {
        Ok(filter_embedding_models(self.list_foundation_models().await?))
    }
}

fn filter_embedding_models(models: Vec<FoundationModel>) -> Vec<FoundationModel> {
    models
        .into_iter()
        .filter(|m| m.model_id.to_lowercase().contains("embed"))
        .collect()
}
