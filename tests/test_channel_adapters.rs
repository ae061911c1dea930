//! HTTP channel adapters against a local stub server.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use notifier::domain::entities::NotificationChannel;
use notifier::domain::ports::DeliveryChannel;
use notifier::infrastructure::providers::webhook_signature::verify_signature;
use notifier::infrastructure::providers::{TeamChatChannel, TelegramChannel, WebhookChannel};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Captured {
    requests: Arc<Mutex<Vec<(HeaderMap, String)>>>,
}

impl Captured {
    fn take(&self) -> Vec<(HeaderMap, String)> {
        std::mem::take(&mut *self.requests.lock().unwrap())
    }
}

async fn record(State(captured): State<Captured>, headers: HeaderMap, body: String) -> StatusCode {
    captured.requests.lock().unwrap().push((headers, body));
    StatusCode::OK
}

async fn telegram_ok(State(captured): State<Captured>, headers: HeaderMap, body: String) -> Json<Value> {
    captured.requests.lock().unwrap().push((headers, body));
    Json(json!({ "ok": true, "result": { "message_id": 4711 } }))
}

async fn telegram_rejects() -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "ok": false, "description": "Bad Request: chat not found" })),
    )
}

async fn server_error() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

async fn spawn_stub() -> (String, Captured) {
    let captured = Captured::default();
    let app = Router::new()
        .route("/ok/:bot/sendMessage", post(telegram_ok))
        .route("/rejects/:bot/sendMessage", post(telegram_rejects))
        .route("/hook", post(record))
        .route("/team", post(record))
        .route("/fail", post(server_error))
        .with_state(captured.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), captured)
}

#[tokio::test]
async fn test_telegram_send_returns_message_id() {
    let (base, captured) = spawn_stub().await;
    let channel = TelegramChannel::with_api_base("123:abc", format!("{}/ok", base)).unwrap();

    let id = channel.send("-100200", "Deploy <prod>", "done & dusted").await.unwrap();
    assert_eq!(id, "4711");

    let requests = captured.take();
    assert_eq!(requests.len(), 1);
    let body: Value = serde_json::from_str(&requests[0].1).unwrap();
    assert_eq!(body["chat_id"], "-100200");
    assert_eq!(body["parse_mode"], "HTML");
    assert_eq!(body["text"], "<b>Deploy &lt;prod&gt;</b>\n\ndone &amp; dusted");

    assert_eq!(channel.channel_type(), NotificationChannel::ChatBot);
    assert!(channel.is_available().await);
}

#[tokio::test]
async fn test_telegram_error_carries_description() {
    let (base, _) = spawn_stub().await;
    let channel = TelegramChannel::with_api_base("123:abc", format!("{}/rejects", base)).unwrap();

    let err = channel.send("1", "", "hello").await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("400"));
    assert!(message.contains("chat not found"));
}

#[tokio::test]
async fn test_webhook_is_signed() {
    let (base, captured) = spawn_stub().await;
    let channel = WebhookChannel::new(Some("s3cret".to_string())).unwrap();

    let delivery_id = channel
        .send(&format!("{}/hook", base), "Build", "green")
        .await
        .unwrap();

    let requests = captured.take();
    assert_eq!(requests.len(), 1);
    let (headers, body) = &requests[0];
    assert_eq!(headers["x-delivery-id"].to_str().unwrap(), delivery_id);
    let signature = headers["x-webhook-signature"].to_str().unwrap();
    assert!(verify_signature(body, signature, "s3cret"));

    let payload: Value = serde_json::from_str(body).unwrap();
    assert_eq!(payload["delivery_id"], delivery_id.as_str());
    assert_eq!(payload["subject"], "Build");
    assert_eq!(payload["message"], "green");
}

#[tokio::test]
async fn test_webhook_without_secret_is_unsigned() {
    let (base, captured) = spawn_stub().await;
    let channel = WebhookChannel::new(None).unwrap();
    channel.send(&format!("{}/hook", base), "", "ping").await.unwrap();

    let requests = captured.take();
    assert!(requests[0].0.get("x-webhook-signature").is_none());
}

#[tokio::test]
async fn test_webhook_server_error_is_a_failure() {
    let (base, _) = spawn_stub().await;
    let channel = WebhookChannel::new(None).unwrap();
    let err = channel
        .send(&format!("{}/fail", base), "", "ping")
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("HTTP 500"));
    assert!(message.contains("boom"));
}

#[tokio::test]
async fn test_team_chat_posts_room_and_text() {
    let (base, captured) = spawn_stub().await;
    let channel = TeamChatChannel::new(format!("{}/team", base)).unwrap();
    channel.send("#releases", "Release", "v2 shipped").await.unwrap();

    let requests = captured.take();
    let body: Value = serde_json::from_str(&requests[0].1).unwrap();
    assert_eq!(body["channel"], "#releases");
    assert_eq!(body["text"], "*Release*\nv2 shipped");
}
