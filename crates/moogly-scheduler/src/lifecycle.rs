//! Event lifecycle: creating runs, recovering them after a restart and routing
//! Join clicks into the state machine.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use moogly_core::config::EventsConfig;
use moogly_core::traits::Notifier;
use moogly_core::types::{ChannelId, MessageId, UserId};

use crate::error::EventError;
use crate::event::{JoinRejection, MapsRun};
use crate::locks::EventLocks;
use crate::render;
use crate::store::EventStore;
use crate::timestamp::{display_tag, parse_trigger_time};

/// Result of a join request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined { roster: Vec<UserId>, remaining: u32 },
    Rejected(JoinRejection),
}

/// Creates runs and dispatches joins.
pub struct EventController {
    store: Arc<dyn EventStore>,
    notifier: Arc<dyn Notifier>,
    locks: Arc<EventLocks>,
    channel: ChannelId,
    default_capacity: u32,
    /// Announcements whose Join button is routed to a run.
    surfaces: RwLock<HashSet<MessageId>>,
}

impl EventController {
    pub fn new(
        store: Arc<dyn EventStore>,
        notifier: Arc<dyn Notifier>,
        locks: Arc<EventLocks>,
        config: &EventsConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            locks,
            channel: config.channel_id,
            default_capacity: config.default_capacity,
            surfaces: RwLock::new(HashSet::new()),
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Announce and persist a new run.
    ///
    /// The announcement id becomes the run id, so the post happens first; when the
    /// record cannot be saved the announcement is deleted again.
    pub async fn create_event(
        &self,
        timestamp: &str,
        capacity: Option<u32>,
    ) -> Result<MapsRun, EventError> {
        let trigger_time = parse_trigger_time(timestamp)?;
        let capacity = capacity.unwrap_or(self.default_capacity);

        let mut run = MapsRun::new(MessageId(0), display_tag(trigger_time), trigger_time, capacity);
        run.id = self
            .notifier
            .post_announcement(self.channel, &render::announcement(&run))
            .await?;

        if let Err(e) = self.store.put(&run).await {
            tracing::warn!("⚠️ Could not save maps run {}, removing its announcement: {e}", run.id);
            if let Err(del) = self.notifier.delete_announcement(self.channel, run.id).await {
                tracing::error!("❌ Orphaned maps run announcement {}: {del}", run.id);
            }
            return Err(e.into());
        }

        self.attach(run.id);
        tracing::info!(
            "📅 Maps run {} created for {} ({} slots)",
            run.id,
            run.trigger_time,
            run.capacity
        );
        Ok(run)
    }

    /// Re-attach Join routing for every stored run. Called once at startup.
    /// Returns how many runs are still waiting for their reminder.
    pub async fn recover_pending_events(&self) -> Result<usize, EventError> {
        let runs = self.store.list_all().await?;
        let mut pending = 0;
        for run in &runs {
            self.attach(run.id);
            if !run.notified() {
                pending += 1;
            }
        }
        tracing::info!(
            "🔄 Recovered {} maps runs ({} awaiting their reminder)",
            runs.len(),
            pending
        );
        Ok(pending)
    }

    /// Whether Join clicks on `id` are routed to a run.
    pub fn is_live(&self, id: MessageId) -> bool {
        self.surfaces
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&id)
    }

    fn attach(&self, id: MessageId) {
        self.surfaces
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id);
    }

    /// Add `user` to run `id` and refresh the announcement.
    pub async fn join(&self, id: MessageId, user: UserId) -> Result<JoinOutcome, EventError> {
        if !self.is_live(id) {
            return Err(EventError::EventNotFound(id));
        }

        let _guard = self.locks.lock(id).await;
        let mut run = self
            .store
            .get(id)
            .await?
            .ok_or(EventError::EventNotFound(id))?;

        let remaining = match run.join(user) {
            Ok(remaining) => remaining,
            Err(rejection) => {
                tracing::debug!("Join of {user} to maps run {id} refused: {rejection:?}");
                return Ok(JoinOutcome::Rejected(rejection));
            }
        };
        self.store.put(&run).await?;
        tracing::info!("🙋 {user} joined maps run {id} ({remaining} slots left)");

        if let Err(e) = self
            .notifier
            .edit_announcement(self.channel, id, &render::announcement(&run))
            .await
        {
            tracing::warn!("⚠️ Could not refresh announcement {id}: {e}");
        }

        Ok(JoinOutcome::Joined {
            roster: run.participants().to_vec(),
            remaining,
        })
    }

    /// Roster of run `id`, in join order.
    pub async fn list_participants(&self, id: MessageId) -> Result<Vec<UserId>, EventError> {
        let run = self
            .store
            .get(id)
            .await?
            .ok_or(EventError::EventNotFound(id))?;
        if self
            .notifier
            .fetch_announcement(self.channel, id)
            .await?
            .is_none()
        {
            return Err(EventError::SourceMessageNotFound(id));
        }
        Ok(run.participants().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ReminderEngine, ReminderSettings};
    use crate::store::MemoryEventStore;
    use crate::testing::RecordingNotifier;
    use async_trait::async_trait;
    use chrono::{TimeDelta, Utc};
    use moogly_core::error::{MooglyError, Result};

    const CHANNEL: ChannelId = ChannelId(500);

    fn config() -> EventsConfig {
        EventsConfig {
            channel_id: CHANNEL,
            ..Default::default()
        }
    }

    struct Fixture {
        store: Arc<MemoryEventStore>,
        notifier: Arc<RecordingNotifier>,
        locks: Arc<EventLocks>,
        controller: Arc<EventController>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryEventStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let locks = Arc::new(EventLocks::new());
        let controller = Arc::new(EventController::new(
            store.clone(),
            notifier.clone(),
            locks.clone(),
            &config(),
        ));
        Fixture {
            store,
            notifier,
            locks,
            controller,
        }
    }

    fn unix_in(minutes: i64) -> String {
        (Utc::now() + TimeDelta::minutes(minutes))
            .timestamp()
            .to_string()
    }

    #[tokio::test]
    async fn test_create_then_load() {
        let f = fixture();
        let run = f
            .controller
            .create_event("2026-11-02 20:00:00", Some(4))
            .await
            .unwrap();

        let loaded = f.store.get(run.id).await.unwrap().unwrap();
        assert_eq!(loaded.trigger_time, run.trigger_time);
        assert_eq!(loaded.capacity, 4);
        assert!(loaded.participants().is_empty());
        assert!(!loaded.notified());
        assert!(f.controller.is_live(run.id));

        let state = f.notifier.state.lock().unwrap();
        let (channel, msg) = &state.posted[&run.id];
        assert_eq!(*channel, CHANNEL);
        assert_eq!(msg.buttons[0].custom_id, render::JOIN_BUTTON_ID);
    }

    #[tokio::test]
    async fn test_default_capacity() {
        let f = fixture();
        let run = f.controller.create_event(&unix_in(60), None).await.unwrap();
        assert_eq!(run.capacity, 8);
    }

    #[tokio::test]
    async fn test_invalid_timestamp_posts_nothing() {
        let f = fixture();
        let err = f.controller.create_event("next friday", None).await.unwrap_err();
        assert!(matches!(err, EventError::InvalidTimestamp(_)));
        assert!(f.notifier.state.lock().unwrap().posted.is_empty());
    }

    #[tokio::test]
    async fn test_signup_scenario() {
        let f = fixture();
        let run = f.controller.create_event(&unix_in(25), Some(2)).await.unwrap();
        let id = run.id;

        assert_eq!(
            f.controller.join(id, UserId(1)).await.unwrap(),
            JoinOutcome::Joined { roster: vec![UserId(1)], remaining: 1 }
        );
        assert_eq!(
            f.controller.join(id, UserId(2)).await.unwrap(),
            JoinOutcome::Joined { roster: vec![UserId(1), UserId(2)], remaining: 0 }
        );
        assert_eq!(
            f.controller.join(id, UserId(3)).await.unwrap(),
            JoinOutcome::Rejected(JoinRejection::CapacityExceeded)
        );
        assert_eq!(
            f.controller.join(id, UserId(1)).await.unwrap(),
            JoinOutcome::Rejected(JoinRejection::AlreadyJoined)
        );

        let engine = ReminderEngine::new(
            f.store.clone(),
            f.notifier.clone(),
            f.locks.clone(),
            ReminderSettings::from(&config()),
        );
        let report = engine.tick_at(Utc::now() + TimeDelta::minutes(5)).await;
        assert_eq!(report.delivered, 1);
        let sent = f.notifier.sent();
        assert!(sent[0].1.embeds[0].description.ends_with("<@1> <@2>"));

        assert_eq!(
            f.controller.join(id, UserId(4)).await.unwrap(),
            JoinOutcome::Rejected(JoinRejection::EventLocked)
        );
        assert_eq!(
            f.controller.list_participants(id).await.unwrap(),
            vec![UserId(1), UserId(2)]
        );
    }

    #[tokio::test]
    async fn test_join_refreshes_announcement() {
        let f = fixture();
        let run = f.controller.create_event(&unix_in(90), Some(3)).await.unwrap();
        f.controller.join(run.id, UserId(42)).await.unwrap();

        let state = f.notifier.state.lock().unwrap();
        let (edited_id, msg) = state.edits.last().unwrap();
        assert_eq!(*edited_id, run.id);
        assert!(msg.embeds[0].description.contains("<@42>"));
        assert!(msg.embeds[0].description.contains("2/3 slots left"));
    }

    #[tokio::test]
    async fn test_unknown_run() {
        let f = fixture();
        assert!(matches!(
            f.controller.join(MessageId(1), UserId(1)).await,
            Err(EventError::EventNotFound(MessageId(1)))
        ));
        assert!(matches!(
            f.controller.list_participants(MessageId(1)).await,
            Err(EventError::EventNotFound(MessageId(1)))
        ));
    }

    #[tokio::test]
    async fn test_list_participants_with_deleted_announcement() {
        let f = fixture();
        let run = f.controller.create_event(&unix_in(90), None).await.unwrap();
        f.notifier.remove(run.id);
        assert!(matches!(
            f.controller.list_participants(run.id).await,
            Err(EventError::SourceMessageNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_recover_reattaches_surfaces() {
        let f = fixture();
        let now = Utc::now();
        let open = MapsRun::new(MessageId(10), "", now + TimeDelta::hours(1), 8);
        let mut done = MapsRun::new(MessageId(11), "", now, 8);
        done.mark_notified().unwrap();
        f.store.put(&open).await.unwrap();
        f.store.put(&done).await.unwrap();

        // A fresh controller over the same store, as after a restart.
        let controller = EventController::new(
            f.store.clone(),
            f.notifier.clone(),
            f.locks.clone(),
            &config(),
        );
        assert!(!controller.is_live(MessageId(10)));
        assert_eq!(controller.recover_pending_events().await.unwrap(), 1);
        assert!(controller.is_live(MessageId(10)));

        assert!(matches!(
            controller.join(MessageId(10), UserId(5)).await.unwrap(),
            JoinOutcome::Joined { remaining: 7, .. }
        ));
        assert_eq!(
            controller.join(MessageId(11), UserId(5)).await.unwrap(),
            JoinOutcome::Rejected(JoinRejection::EventLocked)
        );
    }

    #[tokio::test]
    async fn test_concurrent_joins_respect_capacity() {
        let f = fixture();
        let run = f.controller.create_event(&unix_in(120), Some(3)).await.unwrap();

        let mut handles = Vec::new();
        for user in 0..20u64 {
            let controller = f.controller.clone();
            handles.push(tokio::spawn(async move {
                controller.join(run.id, UserId(user)).await
            }));
        }
        let mut joined = 0;
        for handle in handles {
            if let JoinOutcome::Joined { .. } = handle.await.unwrap().unwrap() {
                joined += 1;
            }
        }
        assert_eq!(joined, 3);
        let stored = f.store.get(run.id).await.unwrap().unwrap();
        assert_eq!(stored.participants().len(), 3);
    }

    struct BrokenStore;

    #[async_trait]
    impl EventStore for BrokenStore {
        async fn get(&self, _id: MessageId) -> Result<Option<MapsRun>> {
            Ok(None)
        }
        async fn put(&self, _run: &MapsRun) -> Result<()> {
            Err(MooglyError::Database("disk I/O error".into()))
        }
        async fn list_pending(&self) -> Result<Vec<MapsRun>> {
            Ok(Vec::new())
        }
        async fn list_all(&self) -> Result<Vec<MapsRun>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_failed_save_removes_announcement() {
        let notifier = Arc::new(RecordingNotifier::new());
        let controller = EventController::new(
            Arc::new(BrokenStore),
            notifier.clone(),
            Arc::new(EventLocks::new()),
            &config(),
        );
        let err = controller.create_event(&unix_in(60), None).await.unwrap_err();
        assert!(matches!(err, EventError::Backend(MooglyError::Database(_))));

        let state = notifier.state.lock().unwrap();
        assert!(state.posted.is_empty());
        assert_eq!(state.deleted.len(), 1);
    }
}
