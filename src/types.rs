//! Shared record types: raw index hits, formatted results and index documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Dense vector produced by the embedding model.
pub type Embedding = Vec<f32>;

/// `_source` of an OpenSearch hit. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitSource {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub sentiment_label: Option<String>,
    pub sentiment_score: Option<f64>,
    pub category: Option<String>,
    pub url: Option<String>,
    pub timestamp: Option<String>,
}

/// One element of `hits.hits` in a search response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: HitSource,
}

/// Sentiment attached to a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: String,
    pub score: f64,
}

/// Uniform result record returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub summary: String,
    pub content: String,
    pub score: f64,
    pub sentiment: Sentiment,
    pub category: String,
}

/// Document as written to the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub embedding: Embedding,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl IndexDocument {
    /// Content-derived id: hex SHA-256 over title and content.
    ///
    /// Identical title+content pairs map to the same id, so re-ingesting a
    /// document overwrites it instead of duplicating it.
    pub fn document_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.content.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Ingest input: an [`IndexDocument`] before its embedding is computed.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentInput {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub sentiment_label: Option<String>,
    #[serde(default)]
    pub sentiment_score: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl DocumentInput {
    pub fn into_document(self, embedding: Embedding) -> IndexDocument {
        IndexDocument {
            title: self.title,
            content: self.content,
            summary: self.summary,
            embedding,
            sentiment_label: self.sentiment_label,
            sentiment_score: self.sentiment_score,
            timestamp: self.timestamp,
            url: self.url,
            category: self.category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(title: &str, content: &str) -> IndexDocument {
        IndexDocument {
            title: title.to_string(),
            content: content.to_string(),
            summary: None,
            embedding: vec![0.1, 0.2],
            sentiment_label: None,
            sentiment_score: None,
            timestamp: None,
            url: None,
            category: None,
        }
    }

    #[test]
    fn test_document_id_is_stable_and_separates_fields() {
        let a = doc("ab", "c");
        let b = doc("a", "bc");
        assert_eq!(a.document_id(), doc("ab", "c").document_id());
        assert_ne!(a.document_id(), b.document_id());
        assert_eq!(a.document_id().len(), 64);
    }

    #[test]
    fn test_raw_hit_tolerates_missing_fields() {
        let hit: RawHit = serde_json::from_str(r#"{"_id": "1", "_source": {"title": "t"}}"#).unwrap();
        assert_eq!(hit.id.as_deref(), Some("1"));
        assert_eq!(hit.score, None);
        assert_eq!(hit.source.title.as_deref(), Some("t"));
        assert_eq!(hit.source.sentiment_label, None);
    }

    #[test]
    fn test_index_document_omits_absent_fields() {
        let value = serde_json::to_value(doc("t", "c")).unwrap();
        assert!(value.get("url").is_none());
        assert_eq!(value["title"], "t");
    }
}
