//! Platform traits. The workflows only talk to the chat platform through these,
//! so tests can swap in recording fakes and production plugs in the Discord client.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Announcement, ChannelId, MessageId, OutgoingMessage, RoleId, UserId};

/// Posting, editing and looking up channel messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Post a new message and return the id the platform assigned to it.
    async fn post_announcement(
        &self,
        channel: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<MessageId>;

    /// Replace the content and controls of an existing message.
    async fn edit_announcement(
        &self,
        channel: ChannelId,
        id: MessageId,
        message: &OutgoingMessage,
    ) -> Result<()>;

    async fn delete_announcement(&self, channel: ChannelId, id: MessageId) -> Result<()>;

    /// `Ok(None)` when the message was deleted upstream.
    async fn fetch_announcement(
        &self,
        channel: ChannelId,
        id: MessageId,
    ) -> Result<Option<Announcement>>;

    /// Send a plain message (reminders, alerts). Fails with `MooglyError::NotFound`
    /// when the channel or the referenced message is gone.
    async fn send_message(&self, channel: ChannelId, message: &OutgoingMessage)
    -> Result<MessageId>;
}

/// Guild membership, roles and direct messages.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn member_exists(&self, user: UserId) -> Result<bool>;
    async fn grant_role(&self, user: UserId, role: RoleId) -> Result<()>;
    async fn revoke_role(&self, user: UserId, role: RoleId) -> Result<()>;
    async fn set_display_name(&self, user: UserId, name: &str) -> Result<()>;
    async fn direct_message(&self, user: UserId, text: &str) -> Result<()>;
}
