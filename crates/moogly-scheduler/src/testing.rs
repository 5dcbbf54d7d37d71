//! Recording `Notifier` used by the unit tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use moogly_core::error::{MooglyError, Result};
use moogly_core::traits::Notifier;
use moogly_core::types::{Announcement, ChannelId, MessageId, OutgoingMessage};

#[derive(Default)]
pub struct State {
    pub next_id: u64,
    /// Live messages by id.
    pub posted: BTreeMap<MessageId, (ChannelId, OutgoingMessage)>,
    pub edits: Vec<(MessageId, OutgoingMessage)>,
    pub deleted: Vec<MessageId>,
    pub sent: Vec<(ChannelId, OutgoingMessage)>,
    pub fail_sends: bool,
    pub send_delay: Option<Duration>,
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub state: Mutex<State>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1000,
                ..Default::default()
            }),
        }
    }

    /// Simulate a moderator deleting the message.
    pub fn remove(&self, id: MessageId) {
        self.state.lock().unwrap().posted.remove(&id);
    }

    pub fn sent(&self) -> Vec<(ChannelId, OutgoingMessage)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.state.lock().unwrap().fail_sends = fail;
    }

    pub fn set_send_delay(&self, delay: Duration) {
        self.state.lock().unwrap().send_delay = Some(delay);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn post_announcement(
        &self,
        channel: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<MessageId> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = MessageId(state.next_id);
        state.posted.insert(id, (channel, message.clone()));
        Ok(id)
    }

    async fn edit_announcement(
        &self,
        _channel: ChannelId,
        id: MessageId,
        message: &OutgoingMessage,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.posted.get_mut(&id) {
            Some(entry) => entry.1 = message.clone(),
            None => return Err(MooglyError::NotFound(format!("message {id}"))),
        }
        state.edits.push((id, message.clone()));
        Ok(())
    }

    async fn delete_announcement(&self, _channel: ChannelId, id: MessageId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.posted.remove(&id);
        state.deleted.push(id);
        Ok(())
    }

    async fn fetch_announcement(
        &self,
        _channel: ChannelId,
        id: MessageId,
    ) -> Result<Option<Announcement>> {
        let state = self.state.lock().unwrap();
        Ok(state.posted.get(&id).map(|(channel_id, msg)| Announcement {
            id,
            channel_id: *channel_id,
            content: msg.content.clone(),
        }))
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<MessageId> {
        let delay = self.state.lock().unwrap().send_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_sends {
            return Err(MooglyError::Channel("503 Service Unavailable".into()));
        }
        state.next_id += 1;
        state.sent.push((channel, message.clone()));
        Ok(MessageId(state.next_id))
    }
}
