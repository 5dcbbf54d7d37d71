//! # Moogly Core
//!
//! Shared building blocks for the Moogly community bot:
//! configuration, the error type, Discord-shaped value types and the
//! platform traits (`Notifier`, `MemberDirectory`) that the event and
//! admission workflows are written against.

pub mod config;
pub mod error;
pub mod migrations;
pub mod traits;
pub mod types;

pub use config::MooglyConfig;
pub use error::{MooglyError, Result};
pub use traits::{MemberDirectory, Notifier};
