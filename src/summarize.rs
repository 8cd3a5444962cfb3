//! Retrieval-augmented summaries: embed the query, fetch neighbors, and ask
//! a Bedrock text model to summarize them.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info};

use crate::bedrock::BedrockRuntime;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::opensearch::VectorIndex;
use crate::types::RawHit;

/// Returned instead of a model call when the search finds nothing.
pub const NO_RESULTS_SUMMARY: &str = "No relevant results found.";

pub const MAX_TOKENS: u32 = 1024;
pub const TEMPERATURE: f64 = 0.2;

/// Prompt sent to the text model. `{query}` and `{snippets}` are replaced.
pub const PROMPT_TEMPLATE: &str = "You are an analyst summarizing search results.

Question: {query}

The following snippets were retrieved for the question, each with its sentiment:

{snippets}
Write a concise summary of what the snippets say about the question. \
Mention where positive and negative sentiment differ. \
Only use information contained in the snippets.";

/// Request body shape for the configured text model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestStyle {
    /// Amazon Titan Text: `inputText` + `textGenerationConfig`.
    #[default]
    TitanText,
    /// Anthropic text completions: `prompt` in Human/Assistant turns.
    AnthropicCompletion,
}

impl RequestStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStyle::TitanText => "titan-text",
            RequestStyle::AnthropicCompletion => "anthropic-completion",
        }
    }

    pub fn request_body(&self, prompt: &str) -> JsonValue {
        match self {
            RequestStyle::TitanText => json!({
                "inputText": prompt,
                "textGenerationConfig": {
                    "maxTokenCount": MAX_TOKENS,
                    "temperature": TEMPERATURE
                }
            }),
            RequestStyle::AnthropicCompletion => json!({
                "prompt": anthropic_prompt(prompt),
                "max_tokens_to_sample": MAX_TOKENS,
                "temperature": TEMPERATURE
            }),
        }
    }
}

impl fmt::Display for RequestStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStyle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "titan-text" => Ok(RequestStyle::TitanText),
            "anthropic-completion" => Ok(RequestStyle::AnthropicCompletion),
            other => Err(Error::Config(format!(
                "unknown request style '{other}' (expected titan-text or anthropic-completion)"
            ))),
        }
    }
}

fn anthropic_prompt(prompt: &str) -> String {
    if prompt.starts_with("\n\nHuman:") {
        prompt.to_string()
    } else {
        format!("\n\nHuman: {prompt}\n\nAssistant:")
    }
}

/// Completion text from any supported response shape.
pub fn parse_completion(response: &JsonValue) -> Option<String> {
    let text = response["results"][0]["outputText"]
        .as_str()
        .or_else(|| response["completion"].as_str())
        .or_else(|| response["outputText"].as_str())?;
    Some(text.to_string())
}

/// Produces text from a prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Bedrock [`TextGenerator`].
#[derive(Debug, Clone)]
pub struct BedrockTextGenerator {
    runtime: BedrockRuntime,
    model_id: String,
    style: RequestStyle,
}

impl BedrockTextGenerator {
    pub fn new(runtime: BedrockRuntime, model_id: impl Into<String>, style: RequestStyle) -> Self {
        Self {
            runtime,
            model_id: model_id.into(),
            style,
        }
    }
}

#[async_trait]
impl TextGenerator for BedrockTextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = self.style.request_body(prompt);
        let response = self.runtime.invoke_model(&self.model_id, &body).await?;
        parse_completion(&response).ok_or_else(|| Error::EmptyCompletion(self.model_id.clone()))
    }
}

/// Snippet block for the prompt, built from the raw hit sources.
pub fn format_snippets(hits: &[RawHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let src = &hit.source;
            format!(
                "Snippet {} (Sentiment: {}):\nTitle: {}\nSummary: {}\nContent: {}\n",
                i + 1,
                src.sentiment_label.as_deref().unwrap_or_default(),
                src.title.as_deref().unwrap_or_default(),
                src.summary.as_deref().unwrap_or_default(),
                src.content.as_deref().unwrap_or_default(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fills the template placeholders in one pass; placeholder text inside the
/// query or snippets is never expanded.
pub fn render_prompt(query: &str, snippets: &str) -> String {
    let mut out = String::with_capacity(PROMPT_TEMPLATE.len() + query.len() + snippets.len());
    let mut rest = PROMPT_TEMPLATE;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{query}") {
            out.push_str(query);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{snippets}") {
            out.push_str(snippets);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Embed, search, prompt.
#[derive(Clone)]
pub struct Summarizer {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn TextGenerator>,
}

impl Summarizer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            embedder,
            index,
            generator,
        }
    }

    pub async fn summarize(&self, query: &str, k: usize) -> Result<String> {
        let embedding = self.embedder.embed(query).await?;
        let hits = self.index.knn_search(&embedding, k).await?;
        if hits.is_empty() {
            info!(query, "No hits to summarize");
            return Ok(NO_RESULTS_SUMMARY.to_string());
        }
        let prompt = render_prompt(query, &format_snippets(&hits));
        debug!(hits = hits.len(), prompt_chars = prompt.len(), "Requesting summary");
        self.generator.generate(&prompt).await
    }
}
