//! In-process channel that records every call.
//!
//! Backs the host's dry-run mode (no webhook configured) and the test
//! suites. Failures can be switched on per operation.

use crate::channels::traits::{MessageChannel, OutboundMessage};
use crate::model::{MessageRef, UserKey};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// One recorded channel call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Sent {
        user: UserKey,
        message_ref: MessageRef,
        message: OutboundMessage,
    },
    Edited {
        user: UserKey,
        message_ref: MessageRef,
        message: OutboundMessage,
    },
    Deleted {
        user: UserKey,
        message_ref: MessageRef,
    },
}

/// Records calls instead of delivering them.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    events: Mutex<Vec<ChannelEvent>>,
    next_id: AtomicU64,
    fail_sends: AtomicBool,
    fail_edits: AtomicBool,
    fail_deletes: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_edits(&self, fail: bool) {
        self.fail_edits.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of recorded calls, oldest first.
    pub fn events(&self) -> Vec<ChannelEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Messages sent to `user`, oldest first.
    pub fn sent_to(&self, user: &UserKey) -> Vec<(MessageRef, OutboundMessage)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ChannelEvent::Sent {
                    user: to,
                    message_ref,
                    message,
                } if &to == user => Some((message_ref, message)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    fn record(&self, event: ChannelEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[async_trait]
impl MessageChannel for RecordingChannel {
    fn id(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, user: &UserKey, message: &OutboundMessage) -> anyhow::Result<MessageRef> {
        if self.fail_sends.load(Ordering::SeqCst) {
            anyhow::bail!("send to {user} refused");
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let message_ref = MessageRef::new(format!("msg-{id}"));
        tracing::debug!(%user, %message_ref, "recording channel send:\n{}", message.body);
        self.record(ChannelEvent::Sent {
            user: user.clone(),
            message_ref: message_ref.clone(),
            message: message.clone(),
        });
        Ok(message_ref)
    }

    async fn edit(
        &self,
        user: &UserKey,
        message_ref: &MessageRef,
        message: &OutboundMessage,
    ) -> anyhow::Result<()> {
        if self.fail_edits.load(Ordering::SeqCst) {
            anyhow::bail!("edit of {message_ref} refused");
        }
        self.record(ChannelEvent::Edited {
            user: user.clone(),
            message_ref: message_ref.clone(),
            message: message.clone(),
        });
        Ok(())
    }

    async fn delete(&self, user: &UserKey, message_ref: &MessageRef) -> anyhow::Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            anyhow::bail!("delete of {message_ref} refused");
        }
        self.record(ChannelEvent::Deleted {
            user: user.clone(),
            message_ref: message_ref.clone(),
        });
        Ok(())
    }
}
