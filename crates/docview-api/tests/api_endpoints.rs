//! REST surface tests against the in-memory store and a scripted fake
//! provider, with a real worker pool consuming the queue.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use docview_api::{create_router, AppState};
use docview_core::config::{
    AppConfig, DatabaseConfig, LlmConfig, ProcessingConfig, QueueConfig, RetentionConfig,
    ServerConfig, StorageConfig,
};
use docview_engine::{
    job_queue, CancelRegistry, ProgressBroker, StoreMetricSink, ViewEngine, WorkerPool,
};
use docview_llm::{ChatMessage, ChatOptions, ChatProvider, LlmGateway, RetryPolicy};
use docview_store::{MemoryStore, Store};

const SMALL_FILE_LIMIT: u64 = 4096;

struct FakeProvider;

#[async_trait]
impl ChatProvider for FakeProvider {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        _options: &ChatOptions,
    ) -> docview_llm::Result<String> {
        let prompt = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        Ok(canned_response(prompt))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

fn canned_response(prompt: &str) -> String {
    if prompt.contains("prerequisites") {
        r#"{"required": ["Shell basics"], "recommended": [], "confidence": 82, "source_ids": [1]}"#.into()
    } else if prompt.contains("staged learning path") {
        r#"{"stages": [{"stage": 1, "title": "Foundations", "content": "Start with the tutorial.", "confidence": 78, "source_ids": [1]}]}"#.into()
    } else if prompt.contains("theory") {
        r#"{"theory": "Read the guide.", "practice": "Do the exercises.", "confidence": 75, "source_ids": [1]}"#.into()
    } else if prompt.contains("technologies") {
        r#"{"technologies": ["Docker"], "confidence": 74, "source_ids": [1]}"#.into()
    } else if prompt.contains("configuration or setup steps") {
        r#"{"steps": [{"step": 1, "description": "Install the runtime.", "confidence": 80, "source_ids": [1]}]}"#.into()
    } else if prompt.contains("system components") {
        r#"{"components": [{"name": "scheduler", "description": "Places workloads.", "type": "service"}]}"#.into()
    } else if prompt.contains("Describe the architecture") {
        r#"{"architecture_view": "api -> db"}"#.into()
    } else if prompt.contains("plain language") {
        r#"{"plain_explanation": "It schedules work."}"#.into()
    } else if prompt.contains("operations checklist") {
        r#"{"items": ["Check health"]}"#.into()
    } else {
        "{}".into()
    }
}

const LEARNING_DOC: &str = "# Container Tutorial\n\n\
    This tutorial is a beginner guide. You will learn the basics of \
    containers in this course, lesson by lesson.\n\n\
    Practice each exercise before moving on to the next lesson of the guide.";

struct TestApp {
    router: axum::Router,
    _blob_dir: tempfile::TempDir,
    _pool: WorkerPool,
}

fn test_app() -> TestApp {
    let blob_dir = tempfile::tempdir().expect("tempdir");

    let config = Arc::new(AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
        },
        database: DatabaseConfig {
            url: "memory://".into(),
            max_connections: 4,
        },
        queue: QueueConfig {
            url: "memory://jobs".into(),
            capacity: 16,
        },
        storage: StorageConfig {
            blob_dir: blob_dir.path().to_string_lossy().into_owned(),
        },
        processing: ProcessingConfig {
            max_file_size_bytes: SMALL_FILE_LIMIT,
            worker_count: 1,
            ..Default::default()
        },
        llm: LlmConfig {
            base_url: "http://fake".into(),
            api_key: "test".into(),
            model: "fake".into(),
            mock_enabled: false,
            mock_failure: "timeout".into(),
            mock_probability: 0.0,
        },
        retention: RetentionConfig { metric_days: 30 },
    });

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let broker = Arc::new(ProgressBroker::new());
    let cancels = Arc::new(CancelRegistry::new());
    let gateway = Arc::new(
        LlmGateway::new(Arc::new(FakeProvider))
            .with_retry_policy(
                RetryPolicy::new(3)
                    .with_backoff(Duration::from_millis(1), Duration::from_millis(2))
                    .with_jitter(false),
            )
            .with_metric_sink(Arc::new(StoreMetricSink::new(store.clone()))),
    );
    let engine = Arc::new(ViewEngine::new(
        store.clone(),
        gateway,
        broker.clone(),
        config.processing.clone(),
    ));

    let (queue, consumer) = job_queue(config.queue.capacity);
    let pool = WorkerPool::spawn(
        1,
        consumer,
        engine.clone(),
        store.clone(),
        broker.clone(),
        cancels.clone(),
        config.processing.job_timeout(),
    );

    let state = AppState {
        store,
        engine,
        queue,
        broker,
        cancels,
        config,
    };

    TestApp {
        router: create_router(state),
        _blob_dir: blob_dir,
        _pool: pool,
    }
}

fn upload_request(path: &str, filename: &str, content: &[u8]) -> Request<Body> {
    let boundary = "XDOCVIEWBOUNDARY";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(path)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get(app: &TestApp, path: &str) -> (StatusCode, Value) {
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(path)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, json_body(response).await)
}

async fn wait_for_completion(app: &TestApp, document_id: &str) -> Value {
    for _ in 0..500 {
        let (status, body) = get(app, &format!("/api/v1/documents/{}/progress", document_id)).await;
        assert_eq!(status, StatusCode::OK);
        match body["status"].as_str() {
            Some("completed") => return body,
            Some("failed") | Some("timeout") | Some("low_quality") => {
                panic!("processing ended in {:?}", body)
            }
            _ => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }
    panic!("document never completed");
}

#[tokio::test]
async fn doc_upload_is_rejected_with_conversion_hint() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(upload_request("/api/v1/documents/upload", "legacy.doc", b"old binary"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error_type"], "unsupported_format");
    assert!(body["user_actions"]
        .as_array()
        .unwrap()
        .iter()
        .any(|a| a["action"] == "convert_to_docx"));
}

#[tokio::test]
async fn unknown_extension_is_rejected() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(upload_request("/api/v1/documents/upload", "tool.exe", b"MZ"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error_type"], "unsupported_format");
}

#[tokio::test]
async fn file_size_boundary() {
    let app = test_app();

    // Exactly at the limit: accepted.
    let at_limit = vec![b'a'; SMALL_FILE_LIMIT as usize];
    let response = app
        .router
        .clone()
        .oneshot(upload_request("/api/v1/documents/upload", "exact.txt", &at_limit))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // One byte over: rejected as too large.
    let over = vec![b'a'; SMALL_FILE_LIMIT as usize + 1];
    let response = app
        .router
        .clone()
        .oneshot(upload_request("/api/v1/documents/upload", "over.txt", &over))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = json_body(response).await;
    assert_eq!(body["error_type"], "file_too_large");
}

#[tokio::test]
async fn upload_process_and_read_results() {
    let app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(upload_request(
            "/api/v1/documents/upload?views=learning",
            "guide.md",
            LEARNING_DOC.as_bytes(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let document_id = body["document_id"].as_str().unwrap().to_string();
    assert_eq!(body["status"], "pending");
    assert_eq!(body["file_type"], "md");
    // The persisted blob is byte-for-byte what the client sent.
    assert_eq!(body["file_size"], LEARNING_DOC.len() as u64);

    let progress = wait_for_completion(&app, &document_id).await;
    assert_eq!(progress["primary_view"], "learning");

    // Multi-view container form.
    let (status, body) = get(&app, &format!("/api/v1/documents/{}/result", document_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["views"]["learning"].is_object());
    assert_eq!(body["meta"]["primary_view"], "learning");

    // Single-view form.
    let (status, body) = get(
        &app,
        &format!("/api/v1/documents/{}/result?view=learning", document_id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["view"], "learning");
    assert!(body["result"]["prerequisites"]["confidence"].is_number());
    assert!(body["quality_score"].is_number());

    // Views status.
    let (status, body) = get(
        &app,
        &format!("/api/v1/documents/{}/views/status", document_id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let learning = &body["views_status"]["learning"];
    assert_eq!(learning["status"], "completed");
    assert_eq!(learning["ready"], true);
    assert_eq!(learning["is_primary"], true);

    // History lists it.
    let (status, body) = get(&app, "/api/v1/documents/history?page=1&page_size=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    // Switch to a view that was not generated.
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!(
                    "/api/v1/documents/{}/switch-view?view=system",
                    document_id
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["from_cache"], false);
    assert_eq!(body["used_intermediate_results"], true);
    assert!(body["result"]["components"].is_array());

    // Recommend views requires the intermediate, which now exists.
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!(
                    "/api/v1/documents/{}/recommend-views",
                    document_id
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["primary_view"], "learning");
    assert!(body["cache_key"].as_str().unwrap().len() == 64);
    assert!(body["detection_scores"]["learning"].is_number());

    // Delete cascades.
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/documents/{}", document_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = get(&app, &format!("/api/v1/documents/{}", document_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_view_name_is_rejected() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(upload_request(
            "/api/v1/documents/upload",
            "guide.md",
            LEARNING_DOC.as_bytes(),
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    let document_id = body["document_id"].as_str().unwrap().to_string();

    let (status, body) = get(
        &app,
        &format!("/api/v1/documents/{}/result?view=video", document_id),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_type"], "bad_request");
}

#[tokio::test]
async fn unknown_document_is_404() {
    let app = test_app();
    let (status, _) = get(
        &app,
        "/api/v1/documents/00000000-0000-0000-0000-000000000000/progress",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_endpoint() {
    let app = test_app();
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
