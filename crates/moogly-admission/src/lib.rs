//! # Moogly Admission
//!
//! Membership applications: an applicant picks their free company, types
//! their in-game name, and an administrator approves (role + nickname) or
//! declines the request.

pub mod application;
pub mod desk;
pub mod persistence;
pub mod store;

pub use application::Application;
pub use desk::{AdmissionAction, AdmissionDesk, AdmissionError};
pub use persistence::SqliteApplicationStore;
pub use store::{ApplicationStore, MemoryApplicationStore};
