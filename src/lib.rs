//! Courtside - match lifecycle and rating engine for pickup sports
//!
//! This crate takes a match from creation through team formation, play and a
//! two-team score agreement, and applies team-average ELO changes to every
//! participant once both teams agree on the final score.

pub mod amqp;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod rating;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{ErrorKind, MatchError, Result};
pub use types::*;

// Re-export key components
pub use amqp::publisher::NotificationPublisher;
pub use lifecycle::{MatchManager, NotificationFailure, ScoreOutcome};
pub use store::{InMemoryMatchStore, MatchStore, StoreTransaction};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
