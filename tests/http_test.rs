mod helpers;

use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use helpers::{entry, test_engine, KeywordEmbedder, ScriptedChat};
use journal_rag::server::router;
use journal_rag::Engine;
use tower::util::ServiceExt;

const ALICE: &str = "My name is Alice. Today I went hiking near the lake.";

async fn alice_engine(chat: ScriptedChat) -> Engine {
    let engine = test_engine(
        Some(Arc::new(KeywordEmbedder::default())),
        Some(Arc::new(chat)),
    );
    engine
        .ingest_entry(entry("alice", "2025-09-24T12:00:00Z", ALICE))
        .await
        .unwrap();
    engine
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn post_json(uri: &str, json: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

#[tokio::test]
async fn chat_stream_body_is_sources_tokens_done() {
    let engine = alice_engine(ScriptedChat::new(&["You went", "\n", "hiking."])).await;
    let request = post_json(
        "/chat/stream",
        serde_json::json!({"user_id": "alice", "question": "Where did I go?"}),
    );

    let response = router(engine).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();

    let expected = format!(
        "event: sources\n\
         data: [{{\"id\":1,\"date\":\"2025-09-24T12:00:00Z\",\"preview\":\"{ALICE}\"}}]\n\n\
         data: You went\n\n\
         data: \\n\n\n\
         data: hiking.\n\n\
         event: done\ndata: [DONE]\n\n"
    );
    assert_eq!(body, expected);
}

#[tokio::test]
async fn chat_stream_reports_model_failure_as_error_event() {
    let engine = alice_engine(ScriptedChat::failing(&["partial"])).await;
    let request = post_json(
        "/chat/stream",
        serde_json::json!({"user_id": "alice", "question": "hiking?"}),
    );

    let (status, body) = send(router(engine), request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("event: sources\n"));
    assert!(body.contains("data: partial\n\n"));
    assert!(body.ends_with(
        "event: error\ndata: {\"error\":\"stream ended before the model finished\"}\n\n"
    ));
    assert!(!body.contains("event: done"));
}

#[tokio::test]
async fn entry_can_be_fetched_then_deleted() {
    let engine = alice_engine(ScriptedChat::new(&[])).await;
    let app = router(engine);

    let get = || Request::get("/entries/1").body(Body::empty()).unwrap();
    let (status, body) = send(app.clone(), get()).await;
    assert_eq!(status, StatusCode::OK);
    let fetched: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(fetched["user_id"], "alice");
    assert_eq!(fetched["body"], ALICE);

    let delete = Request::delete("/entries/1").body(Body::empty()).unwrap();
    let (status, _) = send(app.clone(), delete).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(app, get()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(error["error"].as_str().unwrap().contains("entry 1"));
}

#[tokio::test]
async fn malformed_search_body_is_a_json_400() {
    let engine = alice_engine(ScriptedChat::new(&[])).await;
    let request = Request::builder()
        .method("POST")
        .uri("/search")
        .header("content-type", "application/json")
        .body(Body::from("{\"user_id\": "))
        .unwrap();

    let (status, body) = send(router(engine), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(error["error"].is_string());
}

#[tokio::test]
async fn search_reports_mode_and_results() {
    let engine = alice_engine(ScriptedChat::new(&[])).await;
    let request = post_json(
        "/search",
        serde_json::json!({"user_id": "alice", "query": "hiking", "k": 3}),
    );

    let (status, body) = send(router(engine), request).await;
    assert_eq!(status, StatusCode::OK);
    let response: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(response["mode"], "hybrid");
    assert_eq!(response["results"][0]["text"], ALICE);
}
