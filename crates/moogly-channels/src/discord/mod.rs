//! Discord API v10.

pub mod gateway;
pub mod rest;

pub const API_BASE: &str = "https://discord.com/api/v10";

/// Snowflakes arrive as JSON strings.
pub(crate) fn snowflake<T: From<u64>>(value: &serde_json::Value) -> Option<T> {
    value.as_str()?.parse::<u64>().ok().map(T::from)
}
