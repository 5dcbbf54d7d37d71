//! # Moogly Channels
//! Discord boundary: the REST client behind `Notifier` / `MemberDirectory` and the
//! gateway websocket listener that feeds commands and interactions to the router.

pub mod discord;

pub use discord::gateway::{GatewayEvent, GatewayListener};
pub use discord::rest::DiscordClient;
