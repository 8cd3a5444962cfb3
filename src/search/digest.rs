//! Human-readable digest pushed with `search_complete` notifications.

use crate::types::SearchHit;

pub const POSITIVE: &str = "POSITIVE";
pub const NEGATIVE: &str = "NEGATIVE";

/// Entries listed per sentiment section.
pub const SECTION_LIMIT: usize = 3;

/// Entries listed when no hit carries a known sentiment.
pub const TOP_LIMIT: usize = 5;

/// Compose the digest for `query` over non-empty `results`.
///
/// Hits labelled `POSITIVE` and `NEGATIVE` get their own sections; when
/// neither label occurs, the first results are listed as-is.
pub fn compose(query: &str, results: &[SearchHit]) -> String {
    let mut parts = vec![format!("Found {} results for \"{}\"\n", results.len(), query)];

    let positive: Vec<&SearchHit> = with_label(results, POSITIVE);
    let negative: Vec<&SearchHit> = with_label(results, NEGATIVE);

    if !positive.is_empty() {
        parts.push("**Positive Sentiment Results:**".to_string());
        push_sentiment_entries(&mut parts, &positive);
    }
    if !negative.is_empty() {
        parts.push("**Negative Sentiment Results:**".to_string());
        push_sentiment_entries(&mut parts, &negative);
    }
    if positive.is_empty() && negative.is_empty() {
        parts.push("**Top Results:**".to_string());
        for (i, hit) in results.iter().take(TOP_LIMIT).enumerate() {
            parts.push(format!("{}. **{}**", i + 1, hit.title));
            parts.push(format!("   {}", hit.summary));
            parts.push(format!("   Score: {:.3}\n", hit.score));
        }
    }

    parts.join("\n")
}

fn with_label<'a>(results: &'a [SearchHit], label: &str) -> Vec<&'a SearchHit> {
    results
        .iter()
        .filter(|hit| hit.sentiment.label == label)
        .collect()
}

fn push_sentiment_entries(parts: &mut Vec<String>, hits: &[&SearchHit]) {
    for (i, hit) in hits.iter().take(SECTION_LIMIT).enumerate() {
        parts.push(format!("{}. **{}**", i + 1, hit.title));
        parts.push(format!("   {}", hit.summary));
        parts.push(format!(
            "   Score: {:.3} | Sentiment: {:.3}\n",
            hit.score, hit.sentiment.score
        ));
    }
}
