//! Application store interface and the in-memory implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use moogly_core::error::{MooglyError, Result};
use moogly_core::types::UserId;

use crate::application::Application;

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn get(&self, user: UserId) -> Result<Option<Application>>;

    /// Insert unless the user already has an application. Returns whether it was inserted.
    async fn insert_new(&self, application: &Application) -> Result<bool>;

    /// Record the in-game name. Returns false when there is no application.
    async fn set_ingame_name(&self, user: UserId, name: &str) -> Result<bool>;

    /// Returns whether something was removed.
    async fn remove(&self, user: UserId) -> Result<bool>;

    /// Remove everything; returns how many were removed.
    async fn clear(&self) -> Result<usize>;
}

#[derive(Default)]
pub struct MemoryApplicationStore {
    applications: Mutex<HashMap<UserId, Application>>,
}

impl MemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn applications(&self) -> Result<std::sync::MutexGuard<'_, HashMap<UserId, Application>>> {
        self.applications
            .lock()
            .map_err(|e| MooglyError::Database(format!("Lock: {e}")))
    }
}

#[async_trait]
impl ApplicationStore for MemoryApplicationStore {
    async fn get(&self, user: UserId) -> Result<Option<Application>> {
        Ok(self.applications()?.get(&user).cloned())
    }

    async fn insert_new(&self, application: &Application) -> Result<bool> {
        let mut applications = self.applications()?;
        if applications.contains_key(&application.user_id) {
            return Ok(false);
        }
        applications.insert(application.user_id, application.clone());
        Ok(true)
    }

    async fn set_ingame_name(&self, user: UserId, name: &str) -> Result<bool> {
        Ok(match self.applications()?.get_mut(&user) {
            Some(app) => {
                app.ingame_name = Some(name.to_string());
                true
            }
            None => false,
        })
    }

    async fn remove(&self, user: UserId) -> Result<bool> {
        Ok(self.applications()?.remove(&user).is_some())
    }

    async fn clear(&self) -> Result<usize> {
        let mut applications = self.applications()?;
        let n = applications.len();
        applications.clear();
        Ok(n)
    }
}
