use chrono::{DateTime, Utc};
use moogly_core::types::UserId;
use serde::{Deserialize, Serialize};

/// One pending membership application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub user_id: UserId,
    /// Free company the applicant picked.
    pub company: String,
    /// Filled in by the name form; `None` until submitted.
    pub ingame_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Application {
    pub fn new(user_id: UserId, company: impl Into<String>) -> Self {
        Self {
            user_id,
            company: company.into(),
            ingame_name: None,
            created_at: Utc::now(),
        }
    }
}

/// In-game names are "Name LastName": two words separated by one space.
pub fn is_valid_ingame_name(name: &str) -> bool {
    let parts: Vec<&str> = name.trim().split(' ').collect();
    parts.len() == 2 && parts.iter().all(|p| !p.is_empty())
}
