//! Reminder engine: the loop that pings maps-run rosters before the start.
//! Uses tokio::interval; a tick only touches runs whose reminder is still pending.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use moogly_core::config::EventsConfig;
use moogly_core::traits::Notifier;
use moogly_core::types::{ChannelId, MessageId};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::EventError;
use crate::event::MapsRun;
use crate::locks::EventLocks;
use crate::render;
use crate::store::EventStore;

/// Reminder timing and delivery settings.
#[derive(Debug, Clone)]
pub struct ReminderSettings {
    /// Channel holding the announcements; reminders are posted there too.
    pub channel: ChannelId,
    pub lead: TimeDelta,
    pub check_interval: Duration,
    pub delivery_timeout: Duration,
    pub max_missed_ticks: u32,
    pub alert_channel: Option<ChannelId>,
}

impl From<&EventsConfig> for ReminderSettings {
    fn from(config: &EventsConfig) -> Self {
        Self {
            channel: config.channel_id,
            lead: TimeDelta::minutes(config.reminder_lead_minutes),
            check_interval: Duration::from_secs(config.check_interval_secs.max(1)),
            delivery_timeout: Duration::from_secs(config.delivery_timeout_secs),
            max_missed_ticks: config.max_missed_ticks.max(1),
            alert_channel: config.alert_channel_id,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Pending runs whose reminder time has come.
    pub due: usize,
    pub delivered: usize,
    /// Already reminded by an overlapping tick.
    pub already_notified: usize,
    /// Announcement deleted upstream; retried next tick.
    pub missing: usize,
    /// Transient delivery or store failures; retried next tick.
    pub failed: usize,
    /// Skipped because they were parked after too many failures.
    pub parked: usize,
}

enum Delivery {
    Sent,
    AlreadyNotified,
}

/// Finds due runs and delivers their one-shot reminder.
pub struct ReminderEngine {
    store: Arc<dyn EventStore>,
    notifier: Arc<dyn Notifier>,
    locks: Arc<EventLocks>,
    settings: ReminderSettings,
    /// Consecutive failed ticks per run.
    misses: Mutex<HashMap<MessageId, u32>>,
    /// Runs no longer retried in this process.
    parked: Mutex<HashSet<MessageId>>,
}

impl ReminderEngine {
    pub fn new(
        store: Arc<dyn EventStore>,
        notifier: Arc<dyn Notifier>,
        locks: Arc<EventLocks>,
        settings: ReminderSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            locks,
            settings,
            misses: Mutex::new(HashMap::new()),
            parked: Mutex::new(HashSet::new()),
        }
    }

    pub fn settings(&self) -> &ReminderSettings {
        &self.settings
    }

    /// Deliver due reminders. Called from the reminder loop.
    pub async fn tick(&self) -> TickReport {
        self.tick_at(Utc::now()).await
    }

    /// Tick with an explicit clock.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        let pending = match self.store.list_pending().await {
            Ok(runs) => runs,
            Err(e) => {
                tracing::warn!("⚠️ Reminder tick could not load pending runs: {e}");
                return report;
            }
        };

        for run in pending.iter().filter(|r| r.is_due(now, self.settings.lead)) {
            report.due += 1;
            if self.is_parked(run.id) {
                report.parked += 1;
                continue;
            }

            match self.remind(run.id).await {
                Ok(Delivery::Sent) => {
                    report.delivered += 1;
                    self.clear_misses(run.id);
                }
                Ok(Delivery::AlreadyNotified) => report.already_notified += 1,
                Err(EventError::SourceMessageNotFound(id)) => {
                    report.missing += 1;
                    tracing::warn!("⚠️ Announcement for maps run {id} is gone, retrying next tick");
                    self.record_miss(run, "announcement not found").await;
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("⚠️ Reminder for maps run {} failed: {e}", run.id);
                    self.record_miss(run, &e.to_string()).await;
                }
            }
        }

        if report.due > 0 {
            tracing::info!(
                "🔔 Reminder tick: {} due, {} delivered, {} missing, {} failed, {} parked",
                report.due,
                report.delivered,
                report.missing,
                report.failed,
                report.parked
            );
        }
        report
    }

    /// Deliver and mark one run under its lock.
    async fn remind(&self, id: MessageId) -> Result<Delivery, EventError> {
        let _guard = self.locks.lock(id).await;

        // Re-read under the lock: an overlapping tick may have finished first.
        let mut run = self
            .store
            .get(id)
            .await?
            .ok_or(EventError::EventNotFound(id))?;
        if run.notified() {
            return Ok(Delivery::AlreadyNotified);
        }

        match tokio::time::timeout(self.settings.delivery_timeout, self.deliver(&run)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(EventError::Delivery(format!(
                    "timed out after {:?}",
                    self.settings.delivery_timeout
                )));
            }
        }

        run.mark_notified()?;
        if let Err(e) = self.store.put(&run).await {
            // Delivered but not recorded: park so this process does not send it again.
            tracing::error!("❌ Reminder for maps run {id} sent but not saved: {e}");
            self.park(id);
            return Ok(Delivery::Sent);
        }
        tracing::info!(
            "📣 Reminder sent for maps run {id} ({} joined)",
            run.participants().len()
        );

        if let Err(e) = self
            .notifier
            .edit_announcement(self.settings.channel, id, &render::announcement(&run))
            .await
        {
            tracing::debug!("Could not close signups on announcement {id}: {e}");
        }
        Ok(Delivery::Sent)
    }

    async fn deliver(&self, run: &MapsRun) -> Result<(), EventError> {
        let announcement = self
            .notifier
            .fetch_announcement(self.settings.channel, run.id)
            .await
            .map_err(|e| EventError::Delivery(e.to_string()))?;
        if announcement.is_none() {
            return Err(EventError::SourceMessageNotFound(run.id));
        }

        self.notifier
            .send_message(
                self.settings.channel,
                &render::reminder(run, self.settings.lead),
            )
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    EventError::SourceMessageNotFound(run.id)
                } else {
                    EventError::Delivery(e.to_string())
                }
            })?;
        Ok(())
    }

    fn is_parked(&self, id: MessageId) -> bool {
        self.parked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&id)
    }

    fn park(&self, id: MessageId) {
        self.parked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id);
    }

    fn clear_misses(&self, id: MessageId) {
        self.misses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }

    async fn record_miss(&self, run: &MapsRun, reason: &str) {
        let count = {
            let mut misses = self.misses.lock().unwrap_or_else(|e| e.into_inner());
            let count = misses.entry(run.id).or_insert(0);
            *count += 1;
            *count
        };
        if count < self.settings.max_missed_ticks {
            return;
        }

        self.park(run.id);
        self.clear_misses(run.id);
        tracing::error!(
            "❌ Reminder for maps run {} failed {count} ticks in a row, parked until restart: {reason}",
            run.id
        );
        if let Some(alert_channel) = self.settings.alert_channel {
            let alert = render::delivery_alert(run, count, reason);
            if let Err(e) = self.notifier.send_message(alert_channel, &alert).await {
                tracing::warn!("⚠️ Could not post operator alert: {e}");
            }
        }
    }
}

/// Spawn the reminder loop as a background tokio task.
/// Cancelling `shutdown` stops new ticks; a tick already running completes.
pub fn spawn_reminder_loop(
    engine: Arc<ReminderEngine>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = engine.settings().check_interval;
        tracing::info!("⏰ Reminder loop started (check every {}s)", period.as_secs());

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    engine.tick().await;
                }
            }
        }

        tracing::info!("⏰ Reminder loop stopped");
    })
}
