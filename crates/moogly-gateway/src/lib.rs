//! # Moogly Gateway
//! Turns gateway events into workflow calls and sends the answers back.
//!
//! ```text
//! GatewayListener ──mpsc──▶ serve ──spawn per event──▶ Router
//!                                                       ├── !maps_run / !maps_list → EventController
//!                                                       ├── Join button            → EventController::join
//!                                                       └── !application_* / FC buttons / name modal → AdmissionDesk
//! ```

pub mod routes;
pub mod server;

pub use routes::Router;
pub use server::{Responder, serve};
