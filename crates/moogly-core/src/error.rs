//! Error type shared by every Moogly crate.

/// Top-level error.
#[derive(Debug, thiserror::Error)]
pub enum MooglyError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Channel error: {0}")]
    Channel(String),

    /// The platform reported that the target (message, member, channel) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MooglyError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, MooglyError::NotFound(_))
    }
}

impl From<rusqlite::Error> for MooglyError {
    fn from(e: rusqlite::Error) -> Self {
        MooglyError::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MooglyError>;
