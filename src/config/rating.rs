//! Rating system configuration

use serde::{Deserialize, Serialize};

/// ELO parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    /// Maximum rating change per match
    pub k_factor: f64,
    /// Rating assigned the first time a user plays on a court/sport
    pub initial_rating: i32,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            k_factor: 32.0,
            initial_rating: 1000,
        }
    }
}
