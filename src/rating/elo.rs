//! Team ELO calculations
//!
//! Both teams are reduced to their average rating, and every player on a team
//! receives the same delta: `round(K * (S - E))`. Individual deviation from the
//! team average does not influence the result.

use crate::config::RatingConfig;
use crate::error::{MatchError, Result};
use crate::types::{Score, Team};
use serde::{Deserialize, Serialize};
use skillratings::elo::{expected_score, EloConfig, EloRating};
use skillratings::Outcomes;

/// Per-team result of a rating calculation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamDeltas {
    pub average1: f64,
    pub average2: f64,
    pub expected1: f64,
    pub expected2: f64,
    pub delta1: i32,
    pub delta2: i32,
}

impl TeamDeltas {
    pub fn for_team(&self, team: Team) -> i32 {
        match team {
            Team::One => self.delta1,
            Team::Two => self.delta2,
        }
    }
}

/// ELO calculator for two-team matches
#[derive(Debug, Clone)]
pub struct EloCalculator {
    config: EloConfig,
    initial_rating: i32,
}

impl Default for EloCalculator {
    fn default() -> Self {
        Self {
            config: EloConfig { k: 32.0 },
            initial_rating: 1000,
        }
    }
}

impl EloCalculator {
    pub fn new(config: &RatingConfig) -> Result<Self> {
        if !(config.k_factor > 0.0) {
            return Err(MatchError::validation(format!(
                "K factor must be positive, got {}",
                config.k_factor
            )));
        }

        Ok(Self {
            config: EloConfig {
                k: config.k_factor,
            },
            initial_rating: config.initial_rating,
        })
    }

    pub fn k_factor(&self) -> f64 {
        self.config.k
    }

    /// Rating given to a (user, court, sport) on first contact
    pub fn initial_rating(&self) -> i32 {
        self.initial_rating
    }

    /// Mean rating of a roster. An empty roster counts as a fresh player.
    pub fn team_average(&self, ratings: &[i32]) -> f64 {
        if ratings.is_empty() {
            return self.initial_rating as f64;
        }
        ratings.iter().map(|&r| r as f64).sum::<f64>() / ratings.len() as f64
    }

    /// Outcome for team 1; team 2 gets the complement
    pub fn outcome(score: Score) -> Outcomes {
        match score.score1.cmp(&score.score2) {
            std::cmp::Ordering::Greater => Outcomes::WIN,
            std::cmp::Ordering::Less => Outcomes::LOSS,
            std::cmp::Ordering::Equal => Outcomes::DRAW,
        }
    }

    /// Actual score S for an outcome: 1, 0 or 0.5
    pub fn actual_score(outcome: Outcomes) -> f64 {
        match outcome {
            Outcomes::WIN => 1.0,
            Outcomes::LOSS => 0.0,
            Outcomes::DRAW => 0.5,
        }
    }

    /// Expected scores `(E_self, E_opponent)` for two average ratings
    pub fn expected(&self, average_self: f64, average_opponent: f64) -> (f64, f64) {
        expected_score(
            &EloRating {
                rating: average_self,
            },
            &EloRating {
                rating: average_opponent,
            },
        )
    }

    /// Compute the delta each team's players receive for the given result
    pub fn team_deltas(&self, team1: &[i32], team2: &[i32], score: Score) -> TeamDeltas {
        let average1 = self.team_average(team1);
        let average2 = self.team_average(team2);
        let (expected1, expected2) = self.expected(average1, average2);

        let actual1 = Self::actual_score(Self::outcome(score));
        let actual2 = 1.0 - actual1;

        TeamDeltas {
            average1,
            average2,
            expected1,
            expected2,
            delta1: (self.config.k * (actual1 - expected1)).round() as i32,
            delta2: (self.config.k * (actual2 - expected2)).round() as i32,
        }
    }
}
