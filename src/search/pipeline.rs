//! Query pipeline and the background notify flow built on it.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{error, info};

use super::digest;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::formatter::format_hits;
use crate::notify::{NotificationPayload, NotificationSender};
use crate::opensearch::VectorIndex;
use crate::types::SearchHit;

/// Embed the query, look up neighbors, and format them.
#[derive(Clone)]
pub struct SearchPipeline {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    k: usize,
}

impl SearchPipeline {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, k: usize) -> Self {
        Self { embedder, index, k }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    pub fn index(&self) -> Arc<dyn VectorIndex> {
        Arc::clone(&self.index)
    }

    /// Results in the index's relevance order. Zero hits is not an error.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let start = Instant::now();
        let outcome = self.run(query).await;
        histogram!("search_duration_seconds").record(start.elapsed().as_secs_f64());
        let label = if outcome.is_ok() { "ok" } else { "error" };
        counter!("searches_total", "outcome" => label).increment(1);
        outcome
    }

    async fn run(&self, query: &str) -> Result<Vec<SearchHit>> {
        let embedding = self.embedder.embed(query).await?;
        let hits = self.index.knn_search(&embedding, self.k).await?;
        Ok(format_hits(&hits))
    }
}

/// Terminal state of one background search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    NoResults,
    Completed { total_results: usize },
    Failed { message: String },
}

/// Runs a search and reports progress to one connection.
///
/// Sends `processing`, then exactly one of `no_results`,
/// `search_complete` or `search_error`.
#[derive(Clone)]
pub struct SearchNotifyFlow {
    pipeline: SearchPipeline,
    notifier: NotificationSender,
}

impl SearchNotifyFlow {
    pub fn new(pipeline: SearchPipeline, notifier: NotificationSender) -> Self {
        Self { pipeline, notifier }
    }

    pub async fn run(&self, query: &str, connection_id: &str) -> SearchOutcome {
        self.notifier
            .send(connection_id, &NotificationPayload::processing(query))
            .await;

        match self.pipeline.search(query).await {
            Ok(results) if results.is_empty() => {
                info!(query, "No results found");
                self.notifier
                    .send(connection_id, &NotificationPayload::no_results(query))
                    .await;
                SearchOutcome::NoResults
            }
            Ok(results) => {
                let total_results = results.len();
                let message = digest::compose(query, &results);
                self.notifier
                    .send(
                        connection_id,
                        &NotificationPayload::search_complete(query, message, results),
                    )
                    .await;
                info!(query, total_results, "Search results delivered");
                SearchOutcome::Completed { total_results }
            }
            Err(e) => {
                error!(query, "Background search failed: {}", e);
                self.notifier
                    .send(connection_id, &NotificationPayload::search_error(query, &e))
                    .await;
                SearchOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::notify::{NotificationStatus, Notifier};
    use crate::types::{Embedding, HitSource, RawHit};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    struct StubEmbedder {
        fail: bool,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn model_id(&self) -> &str {
            "stub"
        }

        async fn embed(&self, _text: &str) -> Result<Embedding> {
            if self.fail {
                Err(Error::MissingEmbedding("stub".to_string()))
            } else {
                Ok(vec![1.0, 0.0])
            }
        }
    }

    struct StubIndex(Vec<RawHit>);

    #[async_trait]
    impl VectorIndex for StubIndex {
        async fn knn_search(&self, _embedding: &[f32], k: usize) -> Result<Vec<RawHit>> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<NotificationPayload>>,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn post(&self, _connection_id: &str, payload: &NotificationPayload) -> Result<()> {
            self.sent.lock().await.push(payload.clone());
            Ok(())
        }
    }

    fn labelled(title: &str, label: &str) -> RawHit {
        RawHit {
            id: None,
            score: Some(0.5),
            source: HitSource {
                title: Some(title.to_string()),
                sentiment_label: Some(label.to_string()),
                ..Default::default()
            },
        }
    }

    fn flow(fail: bool, hits: Vec<RawHit>) -> (SearchNotifyFlow, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let pipeline = SearchPipeline::new(
            Arc::new(StubEmbedder { fail }),
            Arc::new(StubIndex(hits)),
            10,
        );
        let flow = SearchNotifyFlow::new(pipeline, NotificationSender::new(recorder.clone()));
        (flow, recorder)
    }

    fn statuses(sent: &[NotificationPayload]) -> Vec<Option<NotificationStatus>> {
        sent.iter().map(|p| p.status).collect()
    }

    #[tokio::test]
    async fn test_search_respects_k_and_order() {
        let hits = (0..4).map(|i| labelled(&format!("t{i}"), "POSITIVE")).collect();
        let pipeline = SearchPipeline::new(
            Arc::new(StubEmbedder { fail: false }),
            Arc::new(StubIndex(hits)),
            2,
        );
        let results = pipeline.search("q").await.unwrap();
        let titles: Vec<&str> = results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["t0", "t1"]);
    }

    #[tokio::test]
    async fn test_zero_hits_sends_one_no_results() {
        let (flow, recorder) = flow(false, vec![]);
        assert_eq!(flow.run("hello", "c1").await, SearchOutcome::NoResults);

        let sent = recorder.sent.lock().await;
        assert_eq!(
            statuses(&sent),
            vec![
                Some(NotificationStatus::Processing),
                Some(NotificationStatus::NoResults)
            ]
        );
        assert_eq!(sent[1].query.as_deref(), Some("hello"));
        assert_eq!(sent[1].results.as_deref(), Some(&[][..]));
    }

    #[tokio::test]
    async fn test_hits_send_digest() {
        let (flow, recorder) = flow(
            false,
            vec![labelled("up", "POSITIVE"), labelled("down", "NEGATIVE")],
        );
        assert_eq!(
            flow.run("hello", "c1").await,
            SearchOutcome::Completed { total_results: 2 }
        );

        let sent = recorder.sent.lock().await;
        let last = sent.last().unwrap();
        assert_eq!(last.status, Some(NotificationStatus::SearchComplete));
        assert_eq!(last.total_results, Some(2));
        assert_eq!(last.message.matches("Sentiment Results:**").count(), 2);
    }

    #[tokio::test]
    async fn test_failure_sends_search_error() {
        let (flow, recorder) = flow(true, vec![]);
        let outcome = flow.run("hello", "c1").await;
        assert!(matches!(outcome, SearchOutcome::Failed { .. }));

        let sent = recorder.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].status, Some(NotificationStatus::SearchError));
        assert!(sent[1]
            .message
            .starts_with("Sorry, I encountered an error while searching: "));
        assert_eq!(sent[1].query.as_deref(), Some("hello"));
        assert_eq!(sent[1].results.as_deref(), Some(&[][..]));
    }
}
