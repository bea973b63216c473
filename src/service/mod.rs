//! Service layer for the courtside match engine
//!
//! This module contains the application state that wires configuration,
//! persistence, notifications and metrics into a `MatchManager`.

pub mod app;

pub use app::{AppState, ServiceError};
