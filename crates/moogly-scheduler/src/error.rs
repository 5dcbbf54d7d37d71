use moogly_core::error::MooglyError;
use moogly_core::types::MessageId;

/// Failures of maps-run operations. Join rejections are not errors, see `JoinRejection`.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error(
        "Invalid timestamp '{0}' (use YYYY-MM-DD HH:MM:SS in UTC, RFC 3339, <t:UNIX> or unix seconds)"
    )]
    InvalidTimestamp(String),

    #[error("Maps run {0} not found")]
    EventNotFound(MessageId),

    #[error("The announcement for maps run {0} no longer exists")]
    SourceMessageNotFound(MessageId),

    #[error("Maps run {0} was already reminded")]
    AlreadyNotified(MessageId),

    #[error("Reminder delivery failed: {0}")]
    Delivery(String),

    /// Store or platform failure.
    #[error(transparent)]
    Backend(#[from] MooglyError),
}
