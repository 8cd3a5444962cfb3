//! Maps raw index hits to [`SearchHit`] records.

use crate::types::{RawHit, SearchHit, Sentiment};

/// Title used when a document has none.
pub const UNTITLED: &str = "Untitled";

/// Placeholder for missing sentiment labels and categories.
pub const UNKNOWN: &str = "Unknown";

/// Characters of content kept when a summary has to be synthesized.
pub const SUMMARY_FALLBACK_CHARS: usize = 200;

pub fn format_hit(hit: &RawHit) -> SearchHit {
    let source = &hit.source;
    let content = source.content.clone().unwrap_or_default();
    let summary = source
        .summary
        .clone()
        .unwrap_or_else(|| fallback_summary(&content));

    SearchHit {
        title: source.title.clone().unwrap_or_else(|| UNTITLED.to_string()),
        summary,
        content,
        score: hit.score.unwrap_or(0.0),
        sentiment: Sentiment {
            label: source
                .sentiment_label
                .clone()
                .unwrap_or_else(|| UNKNOWN.to_string()),
            score: source.sentiment_score.unwrap_or(0.0),
        },
        category: source.category.clone().unwrap_or_else(|| UNKNOWN.to_string()),
    }
}

/// Format hits, preserving the service's relevance order.
pub fn format_hits(hits: &[RawHit]) -> Vec<SearchHit> {
    hits.iter().map(format_hit).collect()
}

/// First 200 characters of `content` followed by an ellipsis.
pub fn fallback_summary(content: &str) -> String {
    let mut summary: String = content.chars().take(SUMMARY_FALLBACK_CHARS).collect();
    summary.push_str("...");
    summary
}
