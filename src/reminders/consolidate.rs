//! Merging newly due doses into one live notification per user.
//!
//! Existing entries keep their status, new ones start unset. Stale
//! notifications are deleted before the merged one is sent, so the user
//! never has two editable reminders at once.
//!
//! Every channel call runs under a deadline. A send that misses it counts
//! as undelivered, so the caller always gets an outcome to persist.

use crate::channels::MessageChannel;
use crate::model::{MessageRef, PendingEdit, Reminder, User};
use crate::reminders::ledger::DoseLedger;
use crate::reminders::matcher::DueDose;
use crate::reminders::render::render_reminder;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one consolidation pass for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsolidationOutcome {
    /// Nothing new was due and nothing waited for delivery.
    Idle,
    /// A merged notification was delivered.
    Delivered {
        message_ref: MessageRef,
        entries: usize,
        added: usize,
    },
    /// Sending failed; the merged entries are kept for the next tick.
    Undelivered {
        entries: usize,
        added: usize,
        error: String,
    },
}

/// Builds and delivers consolidated reminders.
pub struct ReminderConsolidator {
    channel: Arc<dyn MessageChannel>,
    delay: Duration,
    timeout: std::time::Duration,
}

impl ReminderConsolidator {
    /// `delay` is only used to label the delay control.
    pub fn new(channel: Arc<dyn MessageChannel>, delay: Duration) -> Self {
        Self {
            channel,
            delay,
            timeout: std::time::Duration::from_secs(30),
        }
    }

    /// Deadline for each delete and send.
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Merge `due` into `user`'s ledger and (re)deliver the notification.
    ///
    /// Only mutates `user` in memory; the caller persists it.
    pub async fn consolidate(
        &self,
        user: &mut User,
        due: Vec<DueDose>,
        now: DateTime<Utc>,
    ) -> ConsolidationOutcome {
        let user_key = user.key.clone();
        let mut ledger = DoseLedger::new(&mut user.pending_reminders);

        let fresh = ledger.merge_new(due);
        let needs_redelivery = ledger.reminders().iter().any(|r| !r.is_delivered());
        if fresh.is_empty() && !needs_redelivery {
            debug!(user = %user_key, "no new doses to consolidate");
            return ConsolidationOutcome::Idle;
        }

        let added = fresh.len();
        let mut entries = ledger.all_entries();
        entries.extend(
            fresh
                .into_iter()
                .map(|d| PendingEdit::unset(d.key, d.medication_name)),
        );

        for stale in ledger.take_all() {
            let Some(message_ref) = stale.notification_ref else {
                continue;
            };
            let deleted = tokio::time::timeout(
                self.timeout,
                self.channel.delete(&user_key, &message_ref),
            )
            .await
            .unwrap_or_else(|_| Err(anyhow::anyhow!("timed out after {:?}", self.timeout)));
            match deleted {
                Ok(()) => debug!(user = %user_key, %message_ref, "stale reminder deleted"),
                Err(e) => warn!(
                    user = %user_key,
                    %message_ref,
                    "cannot delete stale reminder, continuing: {e}"
                ),
            }
        }

        let message = render_reminder(&entries, self.delay);
        let total = entries.len();
        let sent = tokio::time::timeout(self.timeout, self.channel.send(&user_key, &message))
            .await
            .unwrap_or_else(|_| Err(anyhow::anyhow!("timed out after {:?}", self.timeout)));
        match sent {
            Ok(message_ref) => {
                info!(
                    user = %user_key,
                    %message_ref,
                    entries = total,
                    added,
                    "reminder delivered"
                );
                ledger.push(Reminder::delivered(message_ref.clone(), entries, now));
                ConsolidationOutcome::Delivered {
                    message_ref,
                    entries: total,
                    added,
                }
            }
            Err(e) => {
                warn!(user = %user_key, entries = total, "reminder delivery failed: {e}");
                ledger.push(Reminder::undelivered(entries, now));
                ConsolidationOutcome::Undelivered {
                    entries: total,
                    added,
                    error: e.to_string(),
                }
            }
        }
    }
}
