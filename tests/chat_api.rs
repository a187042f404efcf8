use async_trait::async_trait;
use axum::body::{ to_bytes, Body };
use axum::http::{ header::CONTENT_TYPE, Request, StatusCode };
use axum::response::{ IntoResponse, Response };
use axum::routing::post;
use axum::Router;
use serde_json::{ json, Value };
use shop_assistant::assistant::greeting::{ GreetingMatcher, GreetingScope };
use shop_assistant::assistant::relay::CompletionRelay;
use shop_assistant::assistant::ChatService;
use shop_assistant::error::RelayError;
use shop_assistant::llm::chat::completions::CompletionsClient;
use shop_assistant::llm::chat::{ ChatClient, ChunkStream };
use shop_assistant::models::chat::{ ChatMessage, Role };
use shop_assistant::ratelimit::{ InMemoryRateLimitStore, RateLimitPolicy };
use shop_assistant::server::api::{ router, AppState };
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::{ Arc, Mutex };
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;

/// How the fake upstream behaves once a stream has been opened.
#[derive(Default, Clone, Copy)]
enum StreamScript {
    #[default]
    Hello,
    FailFirst,
    FailAfterFirst,
    Silent,
}

#[derive(Default)]
struct FakeUpstream {
    calls: AtomicUsize,
    last: Mutex<Vec<ChatMessage>>,
    fail_with: Option<String>,
    script: StreamScript,
}

#[async_trait]
impl ChatClient for FakeUpstream {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, RelayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = messages.to_vec();
        match &self.fail_with {
            Some(detail) => Err(RelayError::UpstreamUnavailable(detail.clone())),
            None => Ok("We have red and blue sneakers.".to_string()),
        }
    }

    async fn stream_completion(&self, messages: &[ChatMessage]) -> Result<ChunkStream, RelayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = messages.to_vec();
        let parts: Vec<Result<String, RelayError>> = match self.script {
            StreamScript::Hello => vec![Ok("Hel".into()), Ok("lo".into()), Ok("!".into())],
            StreamScript::FailFirst => vec![Err(RelayError::UpstreamStatus(503))],
            StreamScript::FailAfterFirst => vec![
                Ok("Hel".into()),
                Err(RelayError::UpstreamUnavailable("connection reset".into())),
            ],
            StreamScript::Silent => Vec::new(),
        };
        Ok(Box::pin(futures::stream::iter(parts)))
    }

    fn get_model(&self) -> String {
        "fake".to_string()
    }
}

fn limiter(max_requests: u32) -> Arc<InMemoryRateLimitStore> {
    Arc::new(InMemoryRateLimitStore::new(
        RateLimitPolicy { max_requests, window: Duration::from_secs(60) },
        1000,
    ))
}

fn app(upstream: Arc<dyn ChatClient>, max_requests: u32) -> Router {
    app_with_limiter(upstream, limiter(max_requests))
}

fn app_with_limiter(upstream: Arc<dyn ChatClient>, limiter: Arc<InMemoryRateLimitStore>) -> Router {
    let chat = ChatService::new(
        limiter,
        GreetingMatcher::new(GreetingScope::LastMessage, "Hello!"),
        CompletionRelay::new(upstream, "You are a friendly e-commerce AI chatbot."),
        false,
    );
    router(AppState { chat: Arc::new(chat) })
}

async fn send_chat(app: &Router, uri: &str, body: &str, headers: &[(&str, &str)]) -> Response {
    let mut req = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    for (name, value) in headers {
        req = req.header(*name, *value);
    }
    app.clone()
        .oneshot(req.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

async fn post_chat(
    app: &Router,
    uri: &str,
    body: &str,
    headers: &[(&str, &str)],
) -> (StatusCode, Option<String>, Vec<u8>) {
    let resp = send_chat(app, uri, body, headers).await;
    let status = resp.status();
    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, content_type, bytes.to_vec())
}

fn json_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn greeting_returns_canned_reply_without_upstream_call() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = app(upstream.clone(), 10);

    let (status, _, body) = post_chat(
        &app,
        "/api/chat",
        r#"{"messages":[{"role":"user","content":"Hi"}]}"#,
        &[],
    ).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({ "response": "Hello!" }));
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn question_is_relayed_with_persona_prompt() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = app(upstream.clone(), 10);

    let (status, _, body) = post_chat(
        &app,
        "/api/chat",
        r#"[{"role":"user","content":"Do you sell sneakers?"}]"#,
        &[],
    ).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({ "response": "We have red and blue sneakers." }));
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);

    let sent = upstream.last.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].role, Role::System);
    assert_eq!(sent[1], ChatMessage::user("Do you sell sneakers?"));
}

#[tokio::test]
async fn empty_and_malformed_payloads_are_bad_requests() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = app(upstream.clone(), 10);

    for body in ["[]", "", r#"{"messages": []}"#, "{oops"] {
        let (status, _, bytes) = post_chat(&app, "/api/chat", body, &[]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {:?}", body);
        assert_eq!(
            json_body(&bytes),
            json!({ "error": "Invalid request data. 'messages' array is required." })
        );
    }
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn eleventh_request_in_window_is_rejected() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = app(upstream.clone(), 10);
    let body = r#"{"role":"user","content":"any deals today?"}"#;

    for _ in 0..10 {
        let (status, _, _) = post_chat(&app, "/api/chat", body, &[("x-api-key", "shopper-1")]).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, _, bytes) = post_chat(&app, "/api/chat", body, &[("x-api-key", "shopper-1")]).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(&bytes), json!({ "error": "Too many requests. Please try again later." }));
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 10);

    let (status, _, _) = post_chat(&app, "/api/chat", body, &[("authorization", "Bearer other")]).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn upstream_failure_hides_detail() {
    let upstream = Arc::new(FakeUpstream {
        fail_with: Some("401 invalid key sk-live-123".to_string()),
        ..Default::default()
    });
    let app = app(upstream, 10);

    let (status, _, bytes) = post_chat(&app, "/api/chat", r#"{"content":"where is my order?"}"#, &[]).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(&bytes), json!({ "error": "Internal Server Error" }));
    assert!(!String::from_utf8_lossy(&bytes).contains("sk-live"));
}

#[tokio::test]
async fn streaming_mode_returns_plain_text_chunks() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = app(upstream.clone(), 10);

    let (status, content_type, bytes) = post_chat(
        &app,
        "/api/chat?stream=true",
        r#"{"role":"user","content":"tell me a joke"}"#,
        &[],
    ).await;

    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/plain"));
    assert_eq!(String::from_utf8(bytes).unwrap(), "Hello!");
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn responses_carry_request_id_and_health_is_ok() {
    let app = app(Arc::new(FakeUpstream::default()), 10);

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/chat")
                .body(Body::from(r#"{"content":"hi"}"#))
                .unwrap()
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn credentials_only_reach_the_limiter_hashed() {
    let limiter = limiter(1);
    let app = app_with_limiter(Arc::new(FakeUpstream::default()), limiter.clone());
    let body = r#"{"content":"any deals today?"}"#;

    let (status, _, _) = post_chat(&app, "/api/chat", body, &[("x-api-key", "sk-live-123")]).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = post_chat(&app, "/api/chat", body, &[("x-api-key", "sk-live-123")]).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    assert_eq!(limiter.len(), 1);
    assert!(limiter.record("sk-live-123").is_none());
}

#[tokio::test]
async fn stream_failing_before_first_chunk_gets_error_status() {
    let upstream = Arc::new(FakeUpstream { script: StreamScript::FailFirst, ..Default::default() });
    let app = app(upstream, 10);

    let (status, content_type, bytes) = post_chat(&app, "/api/chat?stream=true", r#"{"content":"x"}"#, &[]).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(content_type.unwrap().starts_with("application/json"));
    assert_eq!(json_body(&bytes), json!({ "error": "Internal Server Error" }));
}

#[tokio::test]
async fn stream_without_content_gets_error_status() {
    let upstream = Arc::new(FakeUpstream { script: StreamScript::Silent, ..Default::default() });
    let app = app(upstream, 10);

    let (status, _, bytes) = post_chat(&app, "/api/chat?stream=true", r#"{"content":"x"}"#, &[]).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(&bytes), json!({ "error": "Internal Server Error" }));
}

#[tokio::test]
async fn stream_failing_mid_response_aborts_the_body() {
    let upstream = Arc::new(FakeUpstream { script: StreamScript::FailAfterFirst, ..Default::default() });
    let app = app(upstream, 10);

    let resp = send_chat(&app, "/api/chat?stream=true", r#"{"content":"x"}"#, &[]).await;

    // The status line is already out by the time the upstream breaks.
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(to_bytes(resp.into_body(), usize::MAX).await.is_err());
}

fn error_frame() -> String {
    format!("data: {}\n\n", json!({ "error": { "message": "model overloaded", "type": "server_error" } }))
}

fn delta_frame(text: &str) -> String {
    format!("data: {}\n\n", json!({ "choices": [{ "delta": { "content": text }, "finish_reason": null }] }))
}

fn sse_response(frames: Vec<String>) -> Response {
    let body = futures::stream::iter(frames.into_iter().map(Ok::<_, std::io::Error>));
    ([(CONTENT_TYPE, "text/event-stream")], Body::from_stream(body)).into_response()
}

/// Upstream that answers 200 and then reports its failure inside the event stream.
async fn spawn_erroring_upstream() -> String {
    let app = Router::new()
        .route("/error-first", post(|| async { sse_response(vec![error_frame()]) }))
        .route("/error-later", post(|| async { sse_response(vec![delta_frame("Hel"), error_frame()]) }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn real_client(endpoint: String) -> Arc<dyn ChatClient> {
    Arc::new(
        CompletionsClient::new(None, "test-model".into(), endpoint, 0.7, 64, Duration::from_secs(5)).unwrap()
    )
}

#[tokio::test]
async fn in_band_upstream_error_is_not_a_successful_reply() {
    let base = spawn_erroring_upstream().await;

    let failing_first = app(real_client(format!("{}/error-first", base)), 10);
    let (status, _, bytes) = post_chat(&failing_first, "/api/chat?stream=true", r#"{"content":"x"}"#, &[]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(&bytes), json!({ "error": "Internal Server Error" }));
    assert!(!String::from_utf8_lossy(&bytes).contains("overloaded"));

    let failing_later = app(real_client(format!("{}/error-later", base)), 10);
    let resp = send_chat(&failing_later, "/api/chat?stream=true", r#"{"content":"x"}"#, &[]).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(to_bytes(resp.into_body(), usize::MAX).await.is_err());
}
