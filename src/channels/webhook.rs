//! HTTP webhook transport.
//!
//! Posts JSON to `{base}/send`, `{base}/edit` and `{base}/delete`. The
//! receiving bridge owns the actual chat platform; `send` must answer with
//! `{"message_ref": ...}` (string or number).

use crate::channels::traits::{MessageChannel, OutboundMessage};
use crate::config::ChannelConfig;
use crate::model::{MessageRef, UserKey};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;

/// Webhook channel adapter.
pub struct WebhookChannel {
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(base_url: impl Into<String>, config: &ChannelConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            auth_token: config.auth_token.clone().filter(|t| !t.trim().is_empty()),
            client,
        })
    }

    async fn post(&self, op: &str, body: Value) -> anyhow::Result<reqwest::Response> {
        let url = format!("{}/{op}", self.base_url);
        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("webhook {op} failed ({status}): {body}");
        }
        Ok(response)
    }
}

#[async_trait]
impl MessageChannel for WebhookChannel {
    fn id(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, user: &UserKey, message: &OutboundMessage) -> anyhow::Result<MessageRef> {
        let response = self
            .post(
                "send",
                json!({
                    "user": user,
                    "body": message.body,
                    "controls": message.controls,
                }),
            )
            .await?;

        let payload: Value = response.json().await?;
        match payload.get("message_ref") {
            Some(Value::String(s)) if !s.is_empty() => Ok(MessageRef::new(s.clone())),
            Some(Value::Number(n)) => Ok(MessageRef::new(n.to_string())),
            _ => anyhow::bail!("webhook send response has no message_ref: {payload}"),
        }
    }

    async fn edit(
        &self,
        user: &UserKey,
        message_ref: &MessageRef,
        message: &OutboundMessage,
    ) -> anyhow::Result<()> {
        self.post(
            "edit",
            json!({
                "user": user,
                "message_ref": message_ref,
                "body": message.body,
                "controls": message.controls,
            }),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, user: &UserKey, message_ref: &MessageRef) -> anyhow::Result<()> {
        self.post(
            "delete",
            json!({
                "user": user,
                "message_ref": message_ref,
            }),
        )
        .await?;
        Ok(())
    }
}
