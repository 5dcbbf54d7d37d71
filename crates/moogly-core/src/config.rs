//! Moogly configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MooglyError, Result};
use crate::types::{ChannelId, GuildId, RoleId};

/// Env var that overrides `token` from the file.
pub const TOKEN_ENV: &str = "MOOGLY_TOKEN";

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MooglyConfig {
    /// Discord bot token.
    #[serde(default)]
    pub token: String,
    /// Prefix for text commands.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub guild_id: GuildId,
    /// Role allowed to run operator commands and review applications.
    #[serde(default)]
    pub admin_role_id: RoleId,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
}

fn default_prefix() -> String { "!".into() }
fn default_database_path() -> String { "~/.moogly/moogly.db".into() }

impl Default for MooglyConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            prefix: default_prefix(),
            guild_id: GuildId::default(),
            admin_role_id: RoleId::default(),
            database_path: default_database_path(),
            events: EventsConfig::default(),
            admission: AdmissionConfig::default(),
        }
    }
}

impl MooglyConfig {
    /// Load config from the default path (~/.moogly/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default().with_env_overrides())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MooglyError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    /// Parse TOML content and apply env overrides.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| MooglyError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config.with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.token = token.trim().to_string();
            }
        }
        self
    }

    /// Check the settings the bot cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.token.is_empty() {
            return Err(MooglyError::Config(format!(
                "No bot token: set `token` in the config file or {TOKEN_ENV}"
            )));
        }
        if self.guild_id.0 == 0 {
            return Err(MooglyError::Config("`guild_id` is required".into()));
        }
        if self.events.channel_id.0 == 0 {
            return Err(MooglyError::Config("`events.channel_id` is required".into()));
        }
        if self.events.reminder_lead_minutes < 0 {
            return Err(MooglyError::Config(
                "`events.reminder_lead_minutes` must not be negative".into(),
            ));
        }
        if self.events.check_interval_secs == 0 {
            return Err(MooglyError::Config(
                "`events.check_interval_secs` must be at least 1".into(),
            ));
        }
        if self.events.delivery_timeout_secs == 0 {
            return Err(MooglyError::Config(
                "`events.delivery_timeout_secs` must be at least 1".into(),
            ));
        }
        if self.events.default_capacity == 0 {
            return Err(MooglyError::Config(
                "`events.default_capacity` must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Database path with `~` expanded.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.database_path).to_string())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Moogly home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".moogly")
    }
}

/// Maps-run events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Channel where runs are announced and reminders are posted.
    #[serde(default)]
    pub channel_id: ChannelId,
    #[serde(default = "default_capacity")]
    pub default_capacity: u32,
    /// How long before the start the reminder goes out.
    #[serde(default = "default_reminder_lead_minutes")]
    pub reminder_lead_minutes: i64,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,
    /// Consecutive failed ticks before a reminder is parked and an operator alerted.
    #[serde(default = "default_max_missed_ticks")]
    pub max_missed_ticks: u32,
    /// Where operator alerts go. Alerts are only logged when unset.
    #[serde(default)]
    pub alert_channel_id: Option<ChannelId>,
}

fn default_capacity() -> u32 { 8 }
fn default_reminder_lead_minutes() -> i64 { 20 }
fn default_check_interval_secs() -> u64 { 60 }
fn default_delivery_timeout_secs() -> u64 { 10 }
fn default_max_missed_ticks() -> u32 { 30 }

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_id: ChannelId::default(),
            default_capacity: default_capacity(),
            reminder_lead_minutes: default_reminder_lead_minutes(),
            check_interval_secs: default_check_interval_secs(),
            delivery_timeout_secs: default_delivery_timeout_secs(),
            max_missed_ticks: default_max_missed_ticks(),
            alert_channel_id: None,
        }
    }
}

/// Membership applications.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Channel where applications are posted for review.
    #[serde(default)]
    pub channel_id: ChannelId,
    /// Role removed from applicants once they are approved.
    #[serde(default)]
    pub applicant_role_id: Option<RoleId>,
    /// Free companies an applicant can pick from.
    #[serde(default)]
    pub companies: Vec<CompanyConfig>,
}

impl AdmissionConfig {
    pub fn company(&self, name: &str) -> Option<&CompanyConfig> {
        self.companies.iter().find(|c| c.name == name)
    }
}

/// A free company and the role its members get.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyConfig {
    pub name: String,
    pub role_id: RoleId,
}
