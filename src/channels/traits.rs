use crate::channels::controls::ControlLayout;
use crate::model::{MessageRef, UserKey};
use async_trait::async_trait;

/// Message body plus its action controls.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutboundMessage {
    pub body: String,
    pub controls: ControlLayout,
}

impl OutboundMessage {
    /// Plain text with no controls.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            controls: ControlLayout::default(),
        }
    }

    pub fn with_controls(body: impl Into<String>, controls: ControlLayout) -> Self {
        Self {
            body: body.into(),
            controls,
        }
    }
}

/// Delivery channel contract. New transports only need to implement this trait.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Stable channel identifier (e.g. `webhook`).
    fn id(&self) -> &'static str;

    /// Deliver a new message and return its reference.
    async fn send(&self, user: &UserKey, message: &OutboundMessage) -> anyhow::Result<MessageRef>;

    /// Replace body and controls of a delivered message.
    async fn edit(
        &self,
        user: &UserKey,
        message_ref: &MessageRef,
        message: &OutboundMessage,
    ) -> anyhow::Result<()>;

    /// Remove a delivered message.
    async fn delete(&self, user: &UserKey, message_ref: &MessageRef) -> anyhow::Result<()>;
}
