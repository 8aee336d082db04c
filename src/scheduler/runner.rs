//! Poller background loop.
//!
//! Spawns a tokio task that ticks on a fixed interval, scans every
//! subscribed user and consolidates due doses. Users are processed on a
//! bounded worker pool. Channel calls carry their own deadline inside the
//! consolidation, so a stuck channel ends as an undelivered reminder while
//! the ledger write of that user always runs to completion.

use crate::config::PollerConfig;
use crate::model::UserKey;
use crate::reminders::{ConsolidationOutcome, ReminderService};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Poller tunables.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub tick_interval: Duration,
    pub max_concurrent_users: usize,
    /// Tick reports kept in memory.
    pub history_limit: usize,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self::from(&PollerConfig::default())
    }
}

impl From<&PollerConfig> for PollerSettings {
    fn from(config: &PollerConfig) -> Self {
        Self {
            tick_interval: Duration::from_secs(config.tick_interval_secs.max(1)),
            max_concurrent_users: config.max_concurrent_users.max(1),
            history_limit: config.history_limit,
        }
    }
}

/// Where the poller is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollerState {
    Idle,
    Scanning,
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Subscribed users loaded.
    pub users_scanned: usize,
    /// Users with due or undelivered doses.
    pub users_polled: usize,
    /// Users who received a notification.
    pub notified: usize,
    /// Newly due doses merged into ledgers.
    pub doses_matched: usize,
    /// Users whose notification could not be delivered.
    pub undelivered: usize,
    /// Users whose poll failed.
    pub failures: usize,
    /// `true` when the tick did not run because another was in flight.
    pub skipped: bool,
}

/// Drives [`ReminderService::poll_user`] for every subscribed user.
pub struct Poller {
    service: Arc<ReminderService>,
    settings: PollerSettings,
    running: AtomicBool,
    history: Mutex<VecDeque<TickReport>>,
}

/// Clears the running flag when a tick ends, even on panic.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Poller {
    pub fn new(service: Arc<ReminderService>, settings: PollerSettings) -> Self {
        Self {
            service,
            settings,
            running: AtomicBool::new(false),
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn service(&self) -> &Arc<ReminderService> {
        &self.service
    }

    pub fn state(&self) -> PollerState {
        if self.running.load(Ordering::Acquire) {
            PollerState::Scanning
        } else {
            PollerState::Idle
        }
    }

    /// Recent tick reports, oldest first.
    pub fn history(&self) -> Vec<TickReport> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Run one tick. A tick requested while another is in flight is skipped.
    pub async fn run_once(&self) -> TickReport {
        let now = self.service.now();
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("poller tick skipped, previous tick still running");
            let report = TickReport {
                started_at: Some(now),
                finished_at: Some(now),
                skipped: true,
                ..TickReport::default()
            };
            self.push_history(report.clone());
            return report;
        }
        let _running = RunningGuard(&self.running);

        let mut report = TickReport {
            started_at: Some(now),
            ..TickReport::default()
        };

        match self.service.store().find_all_subscribed().await {
            Ok(users) => {
                report.users_scanned = users.len();
                let candidates: Vec<UserKey> = users
                    .iter()
                    .filter(|u| self.service.needs_poll(u, now))
                    .map(|u| u.key.clone())
                    .collect();
                report.users_polled = candidates.len();
                self.poll_users(candidates, now, &mut report).await;
            }
            Err(e) => {
                error!("cannot load subscribed users: {e}");
                report.failures += 1;
            }
        }

        self.service.locks().prune();
        self.service.sessions().evict_expired();

        report.finished_at = Some(self.service.now());
        if report.users_polled > 0 || report.failures > 0 {
            info!(
                scanned = report.users_scanned,
                polled = report.users_polled,
                notified = report.notified,
                doses = report.doses_matched,
                undelivered = report.undelivered,
                failures = report.failures,
                "poller tick finished"
            );
        }
        self.push_history(report.clone());
        report
    }

    async fn poll_users(&self, keys: Vec<UserKey>, now: DateTime<Utc>, report: &mut TickReport) {
        let permits = Arc::new(Semaphore::new(self.settings.max_concurrent_users));
        let mut workers = JoinSet::new();

        for key in keys {
            let service = Arc::clone(&self.service);
            let permits = Arc::clone(&permits);
            workers.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let result = service.poll_user(&key, now).await;
                (key, result)
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => match outcome {
                    ConsolidationOutcome::Idle => {}
                    ConsolidationOutcome::Delivered { added, .. } => {
                        report.notified += 1;
                        report.doses_matched += added;
                    }
                    ConsolidationOutcome::Undelivered { added, .. } => {
                        report.undelivered += 1;
                        report.doses_matched += added;
                    }
                },
                Ok((key, Err(e))) => {
                    warn!(user = %key, "poll failed: {e}");
                    report.failures += 1;
                }
                Err(e) => {
                    error!("poll worker crashed: {e}");
                    report.failures += 1;
                }
            }
        }
    }

    fn push_history(&self, report: TickReport) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push_back(report);
        while history.len() > self.settings.history_limit {
            history.pop_front();
        }
    }

    /// Start the poller loop. Cancelling stops future ticks; a tick already
    /// running is allowed to finish.
    pub fn run(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.settings.tick_interval.as_secs(),
                "poller started"
            );
            let mut interval = tokio::time::interval(self.settings.tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("poller cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        self.run_once().await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::channels::{MessageChannel, OutboundMessage, RecordingChannel};
    use crate::clock::ManualClock;
    use crate::model::{
        Dose, Inventory, MedicationRecord, MessageRef, Reminder, Schedule, ScheduleKind, User,
        UserTimezone,
    };
    use crate::reminders::ServiceSettings;
    use crate::store::{InMemoryProfileStore, ProfileStore};
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 5, 0, 0).unwrap()
    }

    fn user_with_tablet(id: &str, at: DateTime<Utc>) -> User {
        let mut user = User::new(UserKey::new(id)).with_timezone(UserTimezone::default());
        user.medications.tablets.push(
            MedicationRecord::new("Aspirin", 10, Schedule::new(ScheduleKind::Daily, at))
                .with_doses(vec![Dose::new(1, Some(at))]),
        );
        user
    }

    fn poller(
        users: Vec<User>,
        channel: Arc<dyn MessageChannel>,
        settings: PollerSettings,
    ) -> (Arc<InMemoryProfileStore>, Poller) {
        let store = Arc::new(InMemoryProfileStore::with_users(users));
        let service = ReminderService::new(
            store.clone(),
            channel,
            Arc::new(ManualClock::new(now())),
            ServiceSettings::default(),
        );
        (store, Poller::new(Arc::new(service), settings))
    }

    #[tokio::test]
    async fn tick_notifies_only_due_users() {
        let channel = Arc::new(RecordingChannel::new());
        let (_, poller) = poller(
            vec![
                user_with_tablet("due", now()),
                user_with_tablet("later", now() + chrono::Duration::hours(1)),
            ],
            channel.clone(),
            PollerSettings::default(),
        );

        let report = poller.run_once().await;
        assert_eq!(report.users_scanned, 2);
        assert_eq!(report.users_polled, 1);
        assert_eq!(report.notified, 1);
        assert_eq!(report.doses_matched, 1);
        assert_eq!(channel.sent_to(&UserKey::new("due")).len(), 1);
        assert!(channel.sent_to(&UserKey::new("later")).is_empty());
        assert_eq!(poller.state(), PollerState::Idle);
    }

    #[tokio::test]
    async fn undelivered_reminders_are_retried_next_tick() {
        let channel = Arc::new(RecordingChannel::new());
        let (store, poller) = poller(
            vec![user_with_tablet("u", now())],
            channel.clone(),
            PollerSettings::default(),
        );

        channel.fail_sends(true);
        let first = poller.run_once().await;
        assert_eq!(first.undelivered, 1);
        let stored = store.find(&UserKey::new("u")).await.unwrap().unwrap();
        assert!(stored.has_undelivered_reminders());

        channel.fail_sends(false);
        let second = poller.run_once().await;
        assert_eq!(second.notified, 1);
        assert_eq!(second.doses_matched, 0);
        let stored = store.find(&UserKey::new("u")).await.unwrap().unwrap();
        assert!(!stored.has_undelivered_reminders());
        assert_eq!(stored.pending_reminders[0].entries.len(), 1);
    }

    #[tokio::test]
    async fn overlapping_tick_is_skipped() {
        let (_, poller) = poller(
            vec![user_with_tablet("u", now())],
            Arc::new(RecordingChannel::new()),
            PollerSettings::default(),
        );
        poller.running.store(true, Ordering::SeqCst);
        assert_eq!(poller.state(), PollerState::Scanning);

        let report = poller.run_once().await;
        assert!(report.skipped);
        assert_eq!(report.users_scanned, 0);
    }

    struct HangingChannel;

    #[async_trait]
    impl MessageChannel for HangingChannel {
        fn id(&self) -> &'static str {
            "hanging"
        }

        async fn send(&self, _: &UserKey, _: &OutboundMessage) -> anyhow::Result<MessageRef> {
            std::future::pending().await
        }

        async fn edit(&self, _: &UserKey, _: &MessageRef, _: &OutboundMessage) -> anyhow::Result<()> {
            Ok(())
        }

        async fn delete(&self, _: &UserKey, _: &MessageRef) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn stuck_channel_leaves_reminders_undelivered() {
        let store = Arc::new(InMemoryProfileStore::with_users([
            user_with_tablet("a", now()),
            user_with_tablet("b", now()),
        ]));
        let service = ReminderService::new(
            store.clone(),
            Arc::new(HangingChannel),
            Arc::new(ManualClock::new(now())),
            ServiceSettings {
                channel_timeout: Duration::from_millis(50),
                ..ServiceSettings::default()
            },
        );
        let poller = Poller::new(Arc::new(service), PollerSettings::default());

        let report = tokio::time::timeout(Duration::from_secs(5), poller.run_once())
            .await
            .unwrap();
        assert_eq!(report.undelivered, 2);
        assert_eq!(report.failures, 0);
        assert_eq!(poller.state(), PollerState::Idle);
        let stored = store.find(&UserKey::new("a")).await.unwrap().unwrap();
        assert!(stored.has_undelivered_reminders());
    }

    /// Delegates to memory but stalls every ledger write.
    struct StallingStore {
        inner: InMemoryProfileStore,
        stall: Duration,
    }

    #[async_trait]
    impl ProfileStore for StallingStore {
        async fn find(&self, key: &UserKey) -> crate::Result<Option<User>> {
            self.inner.find(key).await
        }

        async fn save(&self, user: &User) -> crate::Result<()> {
            self.inner.save(user).await
        }

        async fn save_tracking(
            &self,
            key: &UserKey,
            medications: &Inventory,
            pending_reminders: &[Reminder],
        ) -> crate::Result<()> {
            tokio::time::sleep(self.stall).await;
            self.inner.save_tracking(key, medications, pending_reminders).await
        }

        async fn find_all_subscribed(&self) -> crate::Result<Vec<User>> {
            self.inner.find_all_subscribed().await
        }
    }

    #[tokio::test]
    async fn slow_ledger_write_still_records_the_sent_reminder() {
        let store = Arc::new(StallingStore {
            inner: InMemoryProfileStore::with_users([user_with_tablet("u", now())]),
            stall: Duration::from_millis(200),
        });
        let channel = Arc::new(RecordingChannel::new());
        let service = ReminderService::new(
            store.clone(),
            channel.clone(),
            Arc::new(ManualClock::new(now())),
            ServiceSettings {
                channel_timeout: Duration::from_millis(50),
                ..ServiceSettings::default()
            },
        );
        let poller = Poller::new(Arc::new(service), PollerSettings::default());

        let report = poller.run_once().await;
        assert_eq!(report.notified, 1);
        assert_eq!(report.failures, 0);

        let (sent_ref, _) = channel.sent_to(&UserKey::new("u")).pop().unwrap();
        let stored = store.find(&UserKey::new("u")).await.unwrap().unwrap();
        assert_eq!(stored.pending_reminders.len(), 1);
        assert_eq!(stored.pending_reminders[0].notification_ref, Some(sent_ref));
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let settings = PollerSettings {
            history_limit: 2,
            ..PollerSettings::default()
        };
        let (_, poller) = poller(Vec::new(), Arc::new(RecordingChannel::new()), settings);
        for _ in 0..5 {
            poller.run_once().await;
        }
        assert_eq!(poller.history().len(), 2);
    }

    #[tokio::test]
    async fn cancelled_loop_stops() {
        let (_, poller) = poller(
            Vec::new(),
            Arc::new(RecordingChannel::new()),
            PollerSettings::default(),
        );
        let poller = Arc::new(poller);
        let cancel = CancellationToken::new();
        let handle = Arc::clone(&poller).run(cancel.clone());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(poller.state(), PollerState::Idle);
    }
}
