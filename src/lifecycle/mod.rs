//! Match lifecycle: state machine, team seating and score agreement

pub mod consensus;
pub mod machine;
pub mod manager;
pub mod membership;

pub use consensus::{NotificationFailure, ScoreOutcome};
pub use manager::MatchManager;
