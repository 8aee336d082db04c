//! Entry points for the poller and for user actions.
//!
//! Each operation takes the user's lock, reloads the user, mutates it in
//! memory and writes inventory plus ledger back in one `save_tracking` call.
//! Channel side effects that follow a successful write are best-effort.

use crate::channels::{MessageChannel, OutboundMessage};
use crate::clock::Clock;
use crate::config::DosekeeperConfig;
use crate::error::{DosekeeperError, Result};
use crate::model::{DoseKey, DoseStatus, MessageRef, Reminder, User, UserKey, UserTimezone};
use crate::reminders::commit::{CommitEngine, CommitSummary};
use crate::reminders::consolidate::{ConsolidationOutcome, ReminderConsolidator};
use crate::reminders::editor;
use crate::reminders::matcher::TimeMatcher;
use crate::reminders::render::{render_reminder, render_weight_prompt};
use crate::reminders::token::ActionToken;
use crate::scheduler::locks::UserLocks;
use crate::session::{SessionStep, SessionStore};
use crate::store::ProfileStore;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tunables shared by every operation.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Zone for users without a valid stored zone.
    pub default_zone: UserTimezone,
    /// Deferral applied to delayed doses.
    pub delay: Duration,
    pub catch_up_minutes: u32,
    pub session_ttl: Duration,
    /// Deadline for each channel call made by a poll.
    pub channel_timeout: std::time::Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            default_zone: UserTimezone::default(),
            delay: Duration::hours(3),
            catch_up_minutes: 0,
            session_ttl: Duration::minutes(15),
            channel_timeout: std::time::Duration::from_secs(30),
        }
    }
}

impl ServiceSettings {
    /// # Errors
    ///
    /// Returns an error if the configured default zone cannot be parsed.
    pub fn from_config(config: &DosekeeperConfig) -> Result<Self> {
        let default_zone = UserTimezone::parse(&config.users.default_timezone)
            .map_err(|e| DosekeeperError::Config(format!("users.default_timezone: {e}")))?;
        Ok(Self {
            default_zone,
            delay: config.commit.delay(),
            catch_up_minutes: config.poller.catch_up_minutes,
            session_ttl: Duration::seconds(i64::from(
                u32::try_from(config.session.ttl_secs).unwrap_or(u32::MAX),
            )),
            channel_timeout: std::time::Duration::from_secs(
                config.poller.user_timeout_secs.max(1),
            ),
        })
    }
}

/// Reply to a user action, ready to show next to the pressed control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResponse {
    pub ok: bool,
    pub notice: String,
}

impl ActionResponse {
    fn ok(notice: impl Into<String>) -> Self {
        Self {
            ok: true,
            notice: notice.into(),
        }
    }

    fn failed(err: &DosekeeperError) -> Self {
        Self {
            ok: false,
            notice: err.user_message(),
        }
    }
}

/// The reminder core behind one store, one channel and one clock.
pub struct ReminderService {
    store: Arc<dyn ProfileStore>,
    channel: Arc<dyn MessageChannel>,
    clock: Arc<dyn Clock>,
    locks: UserLocks,
    sessions: SessionStore,
    settings: ServiceSettings,
    matcher: TimeMatcher,
    consolidator: ReminderConsolidator,
    commit: CommitEngine,
}

impl ReminderService {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        channel: Arc<dyn MessageChannel>,
        clock: Arc<dyn Clock>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            matcher: TimeMatcher::new(settings.catch_up_minutes),
            consolidator: ReminderConsolidator::new(Arc::clone(&channel), settings.delay)
                .with_timeout(settings.channel_timeout),
            commit: CommitEngine::new(settings.delay),
            sessions: SessionStore::new(Arc::clone(&clock), settings.session_ttl),
            locks: UserLocks::new(),
            store,
            channel,
            clock,
            settings,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn locks(&self) -> &UserLocks {
        &self.locks
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// `true` if a poll of `user` at `now` could produce work.
    ///
    /// Evaluated on an unlocked snapshot; [`Self::poll_user`] rechecks.
    pub fn needs_poll(&self, user: &User, now: DateTime<Utc>) -> bool {
        if user.has_undelivered_reminders() {
            return true;
        }
        let zone = user.zone(self.settings.default_zone);
        !self
            .matcher
            .due_doses(&user.medications, now, zone)
            .is_empty()
    }

    /// Match and consolidate one user at `now`.
    ///
    /// # Errors
    ///
    /// Fails when the user is unknown or the ledger cannot be saved.
    /// Delivery failures are reported through the outcome instead.
    pub async fn poll_user(&self, key: &UserKey, now: DateTime<Utc>) -> Result<ConsolidationOutcome> {
        let _guard = self.locks.acquire(key).await;
        let mut user = self.load(key).await?;
        if !user.subscribed {
            return Ok(ConsolidationOutcome::Idle);
        }

        let zone = user.zone(self.settings.default_zone);
        let due = self.matcher.due_doses(&user.medications, now, zone);
        if due.is_empty() && !user.has_undelivered_reminders() {
            return Ok(ConsolidationOutcome::Idle);
        }
        debug!(user = %key, due = due.len(), "consolidating");

        let outcome = self.consolidator.consolidate(&mut user, due, now).await;
        if outcome != ConsolidationOutcome::Idle {
            self.save_tracking(&user).await?;
        }
        Ok(outcome)
    }

    /// Record a provisional decision and refresh the notification.
    ///
    /// # Errors
    ///
    /// `NotFound`, `AlreadySet`, or a persistence failure.
    pub async fn set_status(
        &self,
        key: &UserKey,
        dose: DoseKey,
        status: DoseStatus,
    ) -> Result<Reminder> {
        let reminder = {
            let _guard = self.locks.acquire(key).await;
            let mut user = self.load(key).await?;
            let reminder = editor::set_status(&mut user, dose, status)?;
            self.save_tracking(&user).await?;
            reminder
        };
        info!(user = %key, %dose, %status, "dose status set");

        if let Some(message_ref) = &reminder.notification_ref {
            let message = render_reminder(&reminder.entries, self.settings.delay);
            if let Err(e) = self.channel.edit(key, message_ref, &message).await {
                warn!(user = %key, %message_ref, "cannot refresh reminder: {e}");
            }
        }
        Ok(reminder)
    }

    /// Commit the reminder delivered as `message_ref`.
    ///
    /// On success the summary is sent and a weight-update prompt is offered;
    /// neither failing affects the commit.
    ///
    /// # Errors
    ///
    /// `NoActiveReminder`, `NothingToConfirm`, or a persistence failure, in
    /// which case nothing of the confirm is saved.
    pub async fn confirm(&self, key: &UserKey, message_ref: &MessageRef) -> Result<CommitSummary> {
        let summary = {
            let _guard = self.locks.acquire(key).await;
            let mut user = self.load(key).await?;
            let zone = user.zone(self.settings.default_zone);
            let summary = self.commit.confirm(&mut user, message_ref, self.clock.now(), zone)?;
            self.save_tracking(&user).await?;
            summary
        };
        info!(user = %key, %message_ref, changes = summary.lines.len(), "reminder confirmed");

        self.notify(key, &OutboundMessage::text(summary.to_string()), "summary")
            .await;
        self.sessions.set(key, SessionStep::WeightUpdateOffered);
        self.notify(key, &render_weight_prompt(), "weight prompt").await;
        Ok(summary)
    }

    /// Answer the post-confirm weight prompt.
    ///
    /// # Errors
    ///
    /// [`DosekeeperError::SessionExpired`] when no prompt is open.
    pub fn answer_weight_prompt(&self, key: &UserKey, accept: bool) -> Result<&'static str> {
        if self.sessions.get(key) != Some(SessionStep::WeightUpdateOffered) {
            return Err(DosekeeperError::SessionExpired);
        }
        if accept {
            self.sessions.set(key, SessionStep::AwaitingWeight);
            Ok("Enter your weight in kilograms.")
        } else {
            self.sessions.clear(key);
            Ok("Okay, you can update it later.")
        }
    }

    /// Dispatch a control press. Domain errors become user-facing notices.
    pub async fn on_user_action(
        &self,
        key: &UserKey,
        message_ref: &MessageRef,
        token: &str,
    ) -> ActionResponse {
        let result = match ActionToken::parse(token) {
            Ok(ActionToken::SetStatus { key: dose, status }) => self
                .set_status(key, dose, status)
                .await
                .map(|_| format!("Marked as {status}.")),
            Ok(ActionToken::Confirm) => self
                .confirm(key, message_ref)
                .await
                .map(|_| "Changes applied.".to_owned()),
            Ok(ActionToken::WeightUpdate { accept }) => self
                .answer_weight_prompt(key, accept)
                .map(str::to_owned),
            Err(e) => Err(e),
        };

        match result {
            Ok(notice) => ActionResponse::ok(notice),
            Err(e) => {
                match &e {
                    DosekeeperError::Persistence(_)
                    | DosekeeperError::Io(_)
                    | DosekeeperError::Json(_) => {
                        warn!(user = %key, token, "action failed: {e}");
                    }
                    _ => debug!(user = %key, token, "action rejected: {e}"),
                }
                ActionResponse::failed(&e)
            }
        }
    }

    async fn load(&self, key: &UserKey) -> Result<User> {
        self.store
            .find(key)
            .await?
            .ok_or_else(|| DosekeeperError::UnknownUser(key.to_string()))
    }

    async fn save_tracking(&self, user: &User) -> Result<()> {
        self.store
            .save_tracking(&user.key, &user.medications, &user.pending_reminders)
            .await
    }

    async fn notify(&self, key: &UserKey, message: &OutboundMessage, what: &str) {
        if let Err(e) = self.channel.send(key, message).await {
            warn!(user = %key, "cannot send {what}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::channels::{ChannelEvent, RecordingChannel};
    use crate::clock::ManualClock;
    use crate::model::{Dose, MedicationKind, MedicationRecord, Schedule, ScheduleKind};
    use crate::store::InMemoryProfileStore;
    use chrono::TimeZone;

    struct Harness {
        store: Arc<InMemoryProfileStore>,
        channel: Arc<RecordingChannel>,
        clock: Arc<ManualClock>,
        service: ReminderService,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 3, 5, 0, 0).unwrap()
    }

    fn harness(user: User) -> Harness {
        let store = Arc::new(InMemoryProfileStore::with_users([user]));
        let channel = Arc::new(RecordingChannel::new());
        let clock = Arc::new(ManualClock::new(start()));
        let service = ReminderService::new(
            store.clone(),
            channel.clone(),
            clock.clone(),
            ServiceSettings::default(),
        );
        Harness {
            store,
            channel,
            clock,
            service,
        }
    }

    fn tablet_user() -> User {
        let mut user = User::new(UserKey::new("u1"));
        user.medications.tablets.push(
            MedicationRecord::new("Aspirin", 3, Schedule::new(ScheduleKind::Daily, start()))
                .with_doses(vec![Dose::new(1, Some(start()))]),
        );
        user
    }

    fn key() -> UserKey {
        UserKey::new("u1")
    }

    #[tokio::test]
    async fn poll_delivers_and_persists() {
        let h = harness(tablet_user());
        let user = h.store.find(&key()).await.unwrap().unwrap();
        assert!(h.service.needs_poll(&user, start()));

        let outcome = h.service.poll_user(&key(), start()).await.unwrap();
        assert!(matches!(outcome, ConsolidationOutcome::Delivered { added: 1, .. }));

        let stored = h.store.find(&key()).await.unwrap().unwrap();
        assert_eq!(stored.pending_reminders.len(), 1);
        assert!(stored.pending_reminders[0].is_delivered());
    }

    #[tokio::test]
    async fn second_poll_in_same_minute_is_idle() {
        let h = harness(tablet_user());
        h.service.poll_user(&key(), start()).await.unwrap();
        let outcome = h
            .service
            .poll_user(&key(), start() + Duration::seconds(30))
            .await
            .unwrap();
        assert_eq!(outcome, ConsolidationOutcome::Idle);
        assert_eq!(h.channel.sent_to(&key()).len(), 1);
    }

    #[tokio::test]
    async fn set_status_rerenders_in_place() {
        let h = harness(tablet_user());
        h.service.poll_user(&key(), start()).await.unwrap();
        let dose = DoseKey::new(MedicationKind::Tablet, 0, 1);

        let reminder = h
            .service
            .set_status(&key(), dose, DoseStatus::Taken)
            .await
            .unwrap();
        assert_eq!(reminder.entries[0].status, DoseStatus::Taken);

        let edited = h
            .channel
            .events()
            .into_iter()
            .any(|e| matches!(e, ChannelEvent::Edited { .. }));
        assert!(edited);
    }

    #[tokio::test]
    async fn failed_rerender_does_not_fail_the_edit() {
        let h = harness(tablet_user());
        h.service.poll_user(&key(), start()).await.unwrap();
        h.channel.fail_edits(true);

        let result = h
            .service
            .set_status(&key(), DoseKey::new(MedicationKind::Tablet, 0, 1), DoseStatus::Delayed)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn confirm_sends_summary_and_offers_weight_update() {
        let h = harness(tablet_user());
        h.service.poll_user(&key(), start()).await.unwrap();
        let message_ref = h.channel.sent_to(&key())[0].0.clone();
        let token = "status_tablet_0_1_taken";
        assert!(h.service.on_user_action(&key(), &message_ref, token).await.ok);

        let response = h
            .service
            .on_user_action(&key(), &message_ref, "confirm_changes")
            .await;
        assert!(response.ok, "{response:?}");

        let sent = h.channel.sent_to(&key());
        assert!(sent.iter().any(|(_, m)| m.body.contains("Changes applied")));
        assert!(sent.iter().any(|(_, m)| m.body.contains("update your weight")));
        assert_eq!(
            h.service.sessions().get(&key()),
            Some(SessionStep::WeightUpdateOffered)
        );

        let answer = h
            .service
            .on_user_action(&key(), &message_ref, "weight_update_yes")
            .await;
        assert_eq!(answer.notice, "Enter your weight in kilograms.");
        assert_eq!(h.service.sessions().get(&key()), Some(SessionStep::AwaitingWeight));
    }

    #[tokio::test]
    async fn weight_answer_after_ttl_is_expired() {
        let h = harness(tablet_user());
        h.service
            .sessions()
            .set(&key(), SessionStep::WeightUpdateOffered);
        h.clock.advance(Duration::hours(1));

        let response = h
            .service
            .on_user_action(&key(), &MessageRef::new("x"), "weight_update_no")
            .await;
        assert!(!response.ok);
        assert_eq!(response.notice, "This question has expired.");
    }

    #[tokio::test]
    async fn errors_become_notices() {
        let h = harness(tablet_user());
        let response = h
            .service
            .on_user_action(&key(), &MessageRef::new("nope"), "confirm_changes")
            .await;
        assert_eq!(
            response,
            ActionResponse {
                ok: false,
                notice: "Nothing to confirm.".to_owned()
            }
        );

        let response = h
            .service
            .on_user_action(&key(), &MessageRef::new("nope"), "garbage")
            .await;
        assert_eq!(response.notice, "Invalid action.");

        let response = h
            .service
            .on_user_action(&UserKey::new("ghost"), &MessageRef::new("m"), "confirm_changes")
            .await;
        assert_eq!(response.notice, "User not found.");
    }

    #[tokio::test]
    async fn unsubscribed_users_are_not_polled() {
        let mut user = tablet_user();
        user.subscribed = false;
        let h = harness(user);
        let outcome = h.service.poll_user(&key(), start()).await.unwrap();
        assert_eq!(outcome, ConsolidationOutcome::Idle);
        assert!(h.channel.events().is_empty());
    }
}
