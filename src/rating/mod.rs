//! Rating system using team-averaged ELO
//!
//! This module provides the pure rating math and the engine that applies it
//! to every participant of a finished match.

pub mod elo;
pub mod engine;

// Re-export commonly used types
pub use elo::{EloCalculator, TeamDeltas};
pub use engine::RatingEngine;
