//! Utility functions for the match lifecycle engine

use crate::error::{MatchError, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique match ID
pub fn generate_match_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Check that a participant count is even, at least two, and within `max`
pub fn validate_participant_count(count: u32, max: u32) -> Result<()> {
    if count < 2 || count % 2 != 0 {
        return Err(MatchError::validation(format!(
            "participant count must be an even number of at least 2, got {}",
            count
        )));
    }
    if count > max {
        return Err(MatchError::validation(format!(
            "participant count {} exceeds the maximum of {}",
            count, max
        )));
    }
    Ok(())
}
