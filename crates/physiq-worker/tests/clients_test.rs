//! Stage clients against a local stub server.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use physiq_worker::clients::{
    ImageInput, OllamaClient, OpenAiChatClient, StageClient, StageError, StageRequest,
};

#[derive(Clone, Default)]
struct Seen {
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Option<String>>>,
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn request() -> StageRequest {
    StageRequest {
        system: "You are a nutrition assistant.".into(),
        prompt: "Describe the photo.".into(),
        images: vec![ImageInput {
            data: "aGVsbG8=".into(),
            mime_type: "image/png".into(),
        }],
    }
}

#[tokio::test]
async fn test_ollama_returns_response_text() {
    let seen = Seen::default();
    let router = Router::new()
        .route(
            "/api/generate",
            post(|State(seen): State<Seen>, Json(body): Json<Value>| async move {
                seen.bodies.lock().unwrap().push(body);
                Json(json!({"model": "llava", "response": "{\"bodyType\":\"mesomorph\"}", "done": true}))
            }),
        )
        .with_state(seen.clone());
    let base = serve(router).await;

    let client = OllamaClient::new(&format!("{}/", base), "llava").unwrap();
    let text = client.generate(request()).await.unwrap();
    assert_eq!(text, r#"{"bodyType":"mesomorph"}"#);

    let bodies = seen.bodies.lock().unwrap();
    assert_eq!(bodies[0]["model"], "llava");
    assert_eq!(bodies[0]["format"], "json");
    assert_eq!(bodies[0]["stream"], false);
    assert_eq!(bodies[0]["images"], json!(["aGVsbG8="]));
}

#[tokio::test]
async fn test_ollama_error_status_is_reported() {
    let router = Router::new().route(
        "/api/generate",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "model is loading") }),
    );
    let base = serve(router).await;

    let client = OllamaClient::new(&base, "llava").unwrap();
    let err = client.generate(request()).await.unwrap_err();
    match &err {
        StageError::Status { status, body } => {
            assert_eq!(*status, 503);
            assert_eq!(body, "model is loading");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_openai_sends_bearer_and_returns_content() {
    let seen = Seen::default();
    let router = Router::new()
        .route(
            "/v1/chat/completions",
            post(
                |State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    *seen.auth.lock().unwrap() = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    seen.bodies.lock().unwrap().push(body);
                    Json(json!({
                        "choices": [{"message": {"role": "assistant", "content": "{\"dailyCalories\": 2100}"}}]
                    }))
                },
            ),
        )
        .with_state(seen.clone());
    let base = serve(router).await;

    let client =
        OpenAiChatClient::new(&format!("{}/v1", base), "gpt-4o-mini", Some("sk-test".into()))
            .unwrap();
    let text = client.generate(request()).await.unwrap();
    assert_eq!(text, r#"{"dailyCalories": 2100}"#);

    assert_eq!(seen.auth.lock().unwrap().as_deref(), Some("Bearer sk-test"));
    let bodies = seen.bodies.lock().unwrap();
    assert_eq!(bodies[0]["messages"][0]["role"], "system");
    assert_eq!(
        bodies[0]["messages"][1]["content"][1]["image_url"]["url"],
        "data:image/png;base64,aGVsbG8="
    );
}

#[tokio::test]
async fn test_openai_null_content_is_empty() {
    let router = Router::new().route(
        "/chat/completions",
        post(|| async { Json(json!({"choices": [{"message": {"content": null}}]})) }),
    );
    let base = serve(router).await;

    let client = OpenAiChatClient::new(&base, "gpt-4o-mini", None).unwrap();
    let err = client.generate(request()).await.unwrap_err();
    assert!(matches!(err, StageError::Empty));
}
