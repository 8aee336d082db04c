//! Webhook channel contract tests.
//!
//! These tests verify the HTTP shape of every channel call:
//! - `send`, `edit` and `delete` post JSON to their own path
//! - the bearer token is attached when configured
//! - `message_ref` is accepted as a string or a number
//! - non-success statuses and malformed replies surface as errors

#![allow(clippy::unwrap_used, clippy::expect_used)]

use dosekeeper::channels::{Control, ControlLayout, MessageChannel, OutboundMessage, WebhookChannel};
use dosekeeper::config::ChannelConfig;
use dosekeeper::model::{MessageRef, UserKey};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(token: Option<&str>) -> ChannelConfig {
    ChannelConfig {
        webhook_url: None,
        auth_token: token.map(str::to_owned),
        timeout_secs: 5,
    }
}

fn reminder_message() -> OutboundMessage {
    let mut controls = ControlLayout::default();
    controls.push_row(vec![Control::new("✅ Confirm changes", "confirm_changes")]);
    OutboundMessage::with_controls("🕒 Medication reminder:", controls)
}

#[tokio::test]
async fn send_posts_body_and_controls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("authorization", "Bearer secret"))
        .and(body_partial_json(json!({
            "user": "42",
            "body": "🕒 Medication reminder:",
            "controls": [[{"label": "✅ Confirm changes", "token": "confirm_changes"}]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message_ref": "abc"})))
        .expect(1)
        .mount(&server)
        .await;

    let channel = WebhookChannel::new(server.uri(), &config(Some("secret"))).unwrap();
    let message_ref = channel
        .send(&UserKey::new("42"), &reminder_message())
        .await
        .unwrap();
    assert_eq!(message_ref, MessageRef::new("abc"));
}

#[tokio::test]
async fn numeric_message_refs_are_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message_ref": 1017})))
        .mount(&server)
        .await;

    let channel = WebhookChannel::new(format!("{}/", server.uri()), &config(None)).unwrap();
    let message_ref = channel
        .send(&UserKey::new("42"), &OutboundMessage::text("hi"))
        .await
        .unwrap();
    assert_eq!(message_ref.as_str(), "1017");
}

#[tokio::test]
async fn missing_message_ref_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let channel = WebhookChannel::new(server.uri(), &config(None)).unwrap();
    let err = channel
        .send(&UserKey::new("42"), &OutboundMessage::text("hi"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("message_ref"));
}

#[tokio::test]
async fn edit_and_delete_reference_the_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/edit"))
        .and(body_partial_json(json!({"user": "7", "message_ref": "m1"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/delete"))
        .and(body_partial_json(json!({"user": "7", "message_ref": "m1"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let channel = WebhookChannel::new(server.uri(), &config(None)).unwrap();
    let user = UserKey::new("7");
    let message_ref = MessageRef::new("m1");
    channel
        .edit(&user, &message_ref, &reminder_message())
        .await
        .unwrap();
    channel.delete(&user, &message_ref).await.unwrap();
}

#[tokio::test]
async fn server_errors_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/delete"))
        .respond_with(ResponseTemplate::new(400).set_body_string("message to delete not found"))
        .mount(&server)
        .await;

    let channel = WebhookChannel::new(server.uri(), &config(None)).unwrap();
    let err = channel
        .delete(&UserKey::new("7"), &MessageRef::new("gone"))
        .await
        .unwrap_err();
    let text = err.to_string();
    assert!(text.contains("400"), "{text}");
    assert!(text.contains("not found"), "{text}");
}
