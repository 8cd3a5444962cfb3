//! Outbound client tests against in-process mock services.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use semantic_search_backend::types::IndexDocument;
use semantic_search_backend::{
    ApiGatewayNotifier, AwsCredentials, BedrockEmbedder, BedrockRuntime, BedrockTextGenerator,
    CredentialSource, Embedder, Error, NotificationPayload, NotificationSender, Notifier,
    OpenSearchClient, RequestStyle, TextGenerator, VectorIndex,
};

#[derive(Debug, Clone)]
struct Captured {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: String,
}

impl Captured {
    fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }

    fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

type Responder = Arc<dyn Fn(&Method, &str) -> (StatusCode, String) + Send + Sync>;

#[derive(Clone)]
struct MockState {
    captured: Arc<Mutex<Vec<Captured>>>,
    responder: Responder,
}

async fn capture(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let reply = (state.responder)(&method, uri.path());
    state.captured.lock().await.push(Captured {
        method,
        path: uri.path().to_string(),
        headers,
        body,
    });
    reply
}

struct MockService {
    base_url: String,
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl MockService {
    async fn start<F>(responder: F) -> Self
    where
        F: Fn(&Method, &str) -> (StatusCode, String) + Send + Sync + 'static,
    {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            captured: captured.clone(),
            responder: Arc::new(responder),
        };
        let app = Router::new().fallback(capture).with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base_url: format!("http://{addr}"),
            captured,
        }
    }

    async fn requests(&self) -> Vec<Captured> {
        self.captured.lock().await.clone()
    }
}

fn credentials() -> CredentialSource {
    CredentialSource::Static(AwsCredentials::new(
        "AKIDEXAMPLE",
        "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
        Some("session-token".to_string()),
    ))
}

fn opensearch(base_url: &str) -> OpenSearchClient {
    OpenSearchClient::new(
        reqwest::Client::new(),
        credentials(),
        "us-east-1",
        Some(base_url),
        "semantic-search-index",
    )
}

fn runtime(base_url: &str) -> BedrockRuntime {
    BedrockRuntime::new(reqwest::Client::new(), credentials(), "us-west-2", base_url)
}

fn document(title: &str) -> IndexDocument {
    IndexDocument {
        title: title.to_string(),
        content: format!("{title} content"),
        summary: None,
        embedding: vec![0.1, 0.2, 0.3],
        sentiment_label: Some("POSITIVE".to_string()),
        sentiment_score: Some(0.8),
        timestamp: None,
        url: None,
        category: Some("news".to_string()),
    }
}

fn assert_signed(request: &Captured, region: &str, service: &str) {
    let authorization = request.header("authorization");
    assert!(
        authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"),
        "{authorization}"
    );
    assert!(authorization.contains(&format!("/{region}/{service}/aws4_request")));
    assert!(authorization.contains("SignedHeaders="));
    assert!(authorization.contains("Signature="));
    assert!(!request.header("x-amz-date").is_empty());
    assert_eq!(request.header("x-amz-security-token"), "session-token");
}

#[tokio::test]
async fn test_knn_search_posts_signed_query_and_parses_hits() {
    let mock = MockService::start(|_, _| {
        (
            StatusCode::OK,
            json!({"hits": {"hits": [
                {"_id": "a", "_score": 0.93, "_source": {"title": "First", "sentiment_label": "POSITIVE"}},
                {"_id": "b", "_score": 0.71, "_source": {"content": "no title"}}
            ]}})
            .to_string(),
        )
    })
    .await;

    let hits = opensearch(&mock.base_url)
        .knn_search(&[0.5, 0.25], 2)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].source.title.as_deref(), Some("First"));
    assert_eq!(hits[1].score, Some(0.71));

    let requests = mock.requests().await;
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.path, "/semantic-search-index/_search");
    assert_signed(request, "us-east-1", "es");

    let body = request.json();
    assert_eq!(body["size"], 2);
    assert_eq!(body["query"]["knn"]["embedding"]["k"], 2);
    assert_eq!(body["query"]["knn"]["embedding"]["vector"], json!([0.5, 0.25]));
    assert_eq!(body["_source"].as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn test_knn_search_without_hits_is_empty() {
    let mock = MockService::start(|_, _| (StatusCode::OK, json!({"took": 2}).to_string())).await;
    let hits = opensearch(&mock.base_url).knn_search(&[0.1], 5).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_knn_search_error_status_carries_body() {
    let mock = MockService::start(|_, _| {
        (
            StatusCode::FORBIDDEN,
            r#"{"message":"no permissions for [indices:data/read/search]"}"#.to_string(),
        )
    })
    .await;

    let err = opensearch(&mock.base_url)
        .knn_search(&[0.1], 5)
        .await
        .unwrap_err();
    match err {
        Error::Upstream {
            service,
            status,
            body,
        } => {
            assert_eq!(service, "OpenSearch");
            assert_eq!(status, 403);
            assert!(body.contains("no permissions"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_create_index_puts_mapping() {
    let mock = MockService::start(|_, _| {
        (
            StatusCode::OK,
            json!({"acknowledged": true, "index": "semantic-search-index"}).to_string(),
        )
    })
    .await;

    opensearch(&mock.base_url).create_index().await.unwrap();

    let requests = mock.requests().await;
    assert_eq!(requests[0].method, Method::PUT);
    assert_eq!(requests[0].path, "/semantic-search-index");
    let body = requests[0].json();
    assert_eq!(body["settings"]["index"]["knn"], true);
    assert_eq!(
        body["mappings"]["properties"]["embedding"]["dimension"],
        1536
    );
}

#[tokio::test]
async fn test_add_document_uses_content_id() {
    let mock = MockService::start(|_, _| (StatusCode::CREATED, json!({"result": "created"}).to_string())).await;
    let doc = document("Launch");

    let id = opensearch(&mock.base_url)
        .add_document(&doc, None)
        .await
        .unwrap();
    assert_eq!(id, doc.document_id());

    let requests = mock.requests().await;
    assert_eq!(requests[0].method, Method::PUT);
    assert_eq!(
        requests[0].path,
        format!("/semantic-search-index/_doc/{}", doc.document_id())
    );
    assert_eq!(requests[0].json()["title"], "Launch");
}

#[tokio::test]
async fn test_bulk_add_sends_ndjson_and_counts_item_errors() {
    let mock = MockService::start(|_, _| {
        (
            StatusCode::OK,
            json!({"errors": true, "items": [
                {"index": {"_id": "1", "status": 201}},
                {"index": {"_id": "2", "status": 400, "error": {"type": "mapper_parsing_exception"}}}
            ]})
            .to_string(),
        )
    })
    .await;

    let report = opensearch(&mock.base_url)
        .bulk_add(&[document("a"), document("b")])
        .await
        .unwrap();
    assert_eq!(report.submitted, 2);
    assert_eq!(report.failed, 1);
    assert!(!report.is_success());

    let requests = mock.requests().await;
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].path, "/_bulk");
    assert_eq!(requests[0].header("content-type"), "application/x-ndjson");
    assert!(requests[0].body.ends_with('\n'));
    assert_eq!(requests[0].body.lines().count(), 4);
}

#[tokio::test]
async fn test_index_info_keeps_partial_failures() {
    let mock = MockService::start(|_, path| {
        if path.ends_with("/_stats") {
            (
                StatusCode::OK,
                json!({"indices": {"semantic-search-index": {"total": {
                    "docs": {"count": 12},
                    "store": {"size_in_bytes": 4096}
                }}}})
                .to_string(),
            )
        } else {
            (StatusCode::NOT_FOUND, "no mapping".to_string())
        }
    })
    .await;

    let info = opensearch(&mock.base_url).index_info().await.unwrap();
    assert_eq!(info.doc_count(), Some(12));
    assert_eq!(info.store_size_bytes(), Some(4096));
    assert_eq!(info.mapping, Value::String("Error: no mapping".to_string()));
}

#[tokio::test]
async fn test_cluster_health() {
    let mock = MockService::start(|_, _| {
        (
            StatusCode::OK,
            json!({"cluster_name": "demo", "status": "green", "number_of_nodes": 3}).to_string(),
        )
    })
    .await;

    let health = opensearch(&mock.base_url).cluster_health().await.unwrap();
    assert_eq!(health.status, "green");
    assert_eq!(health.number_of_nodes, 3);
    assert_eq!(mock.requests().await[0].path, "/_cluster/health");
}

#[tokio::test]
async fn test_bedrock_embedding() {
    let mock = MockService::start(|_, _| {
        (
            StatusCode::OK,
            json!({"embedding": [0.1, 0.2, 0.3], "inputTextTokenCount": 3}).to_string(),
        )
    })
    .await;

    let embedder = BedrockEmbedder::new(runtime(&mock.base_url), "amazon.titan-embed-text-v1");
    let embedding = embedder.embed("hello world").await.unwrap();
    assert_eq!(embedding, vec![0.1, 0.2, 0.3]);

    let requests = mock.requests().await;
    assert_eq!(requests[0].path, "/model/amazon.titan-embed-text-v1/invoke");
    assert_eq!(requests[0].json(), json!({"inputText": "hello world"}));
    assert_signed(&requests[0], "us-west-2", "bedrock");
}

#[tokio::test]
async fn test_bedrock_empty_embedding_fails() {
    let mock = MockService::start(|_, _| (StatusCode::OK, json!({"embedding": []}).to_string())).await;
    let embedder = BedrockEmbedder::new(runtime(&mock.base_url), "amazon.titan-embed-text-v1");
    assert!(matches!(
        embedder.embed("hello").await,
        Err(Error::MissingEmbedding(_))
    ));
}

#[tokio::test]
async fn test_bedrock_connection_report() {
    let mock = MockService::start(|_, _| (StatusCode::OK, json!({"embedding": vec![0.0; 8]}).to_string())).await;
    let embedder = BedrockEmbedder::new(runtime(&mock.base_url), "amazon.titan-embed-text-v1");
    let report = embedder.test_connection().await.unwrap();
    assert_eq!(report.dimensions, 8);
    assert_eq!(report.region, "us-west-2");
}

#[tokio::test]
async fn test_anthropic_text_generation() {
    let mock = MockService::start(|_, _| {
        (
            StatusCode::OK,
            json!({"completion": " Mostly positive.", "stop_reason": "stop_sequence"}).to_string(),
        )
    })
    .await;

    let generator = BedrockTextGenerator::new(
        runtime(&mock.base_url),
        "anthropic.claude-v2:1",
        RequestStyle::AnthropicCompletion,
    );
    let text = generator.generate("Summarize").await.unwrap();
    assert_eq!(text, " Mostly positive.");

    let requests = mock.requests().await;
    assert_eq!(requests[0].path, "/model/anthropic.claude-v2%3A1/invoke");
    let body = requests[0].json();
    assert_eq!(body["prompt"], "\n\nHuman: Summarize\n\nAssistant:");
    assert_eq!(body["max_tokens_to_sample"], 1024);
}

#[tokio::test]
async fn test_titan_text_without_output_fails() {
    let mock = MockService::start(|_, _| (StatusCode::OK, json!({"results": []}).to_string())).await;
    let generator = BedrockTextGenerator::new(
        runtime(&mock.base_url),
        "amazon.titan-text-lite-v1",
        RequestStyle::TitanText,
    );
    assert!(matches!(
        generator.generate("Summarize").await,
        Err(Error::EmptyCompletion(_))
    ));
    assert!(mock.requests().await[0].json()["textGenerationConfig"].is_object());
}

#[tokio::test]
async fn test_notifier_posts_to_connection() {
    let mock = MockService::start(|_, _| (StatusCode::OK, String::new())).await;
    let notifier = ApiGatewayNotifier::new(
        reqwest::Client::new(),
        credentials(),
        "us-east-1",
        &format!("{}/production", mock.base_url),
    );

    notifier
        .post("abc123=", &NotificationPayload::processing("hello"))
        .await
        .unwrap();

    let requests = mock.requests().await;
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].path, "/production/@connections/abc123%3D");
    assert_signed(&requests[0], "us-east-1", "execute-api");
    let body = requests[0].json();
    assert_eq!(body["status"], "processing");
    assert_eq!(body["message"], "Processing semantic search for: hello");
    assert_eq!(body["query"], "hello");
}

#[tokio::test]
async fn test_gone_connection_is_reported_by_notifier_but_not_sender() {
    let mock = MockService::start(|_, _| (StatusCode::GONE, String::new())).await;
    let notifier = Arc::new(ApiGatewayNotifier::new(
        reqwest::Client::new(),
        credentials(),
        "us-east-1",
        &format!("{}/production", mock.base_url),
    ));

    let err = notifier
        .post("stale", &NotificationPayload::no_results("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConnectionGone(ref id) if id == "stale"));

    // The sender swallows the same failure.
    NotificationSender::new(notifier)
        .send("stale", &NotificationPayload::no_results("hello"))
        .await;
    assert_eq!(mock.requests().await.len(), 2);
}
