//! `_bulk` payload construction and response parsing.

use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::error::Result;
use crate::types::IndexDocument;

/// Result of a bulk upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkReport {
    pub submitted: usize,
    pub failed: usize,
}

impl BulkReport {
    /// True only when no item reported an error.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Newline-delimited action/document pairs, ending with a newline.
pub fn bulk_body(index_name: &str, documents: &[IndexDocument]) -> Result<String> {
    let mut body = String::new();
    for document in documents {
        let action = json!({
            "index": { "_index": index_name, "_id": document.document_id() }
        });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(document)?);
        body.push('\n');
    }
    Ok(body)
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<JsonValue>,
}

/// Count items whose `index` action carries an `error`.
pub fn parse_bulk_response(text: &str, submitted: usize) -> Result<BulkReport> {
    let response: BulkResponse = serde_json::from_str(text)?;
    let failed = response
        .items
        .iter()
        .filter(|item| item.get("index").and_then(|op| op.get("error")).is_some())
        .count();
    Ok(BulkReport { submitted, failed })
}
