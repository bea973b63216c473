//! Two-team score agreement
//!
//! The first member to vote for a team becomes that team's voter of record.
//! Only that member may vote again for the team, and consensus is reached when
//! the opposing team's vote carries the exact same score pair.

use crate::error::{MatchError, Result};
use crate::store::StoreTransaction;
use crate::types::{Match, RatingChange, Score, ScoreVote, UserId};
use crate::utils::current_timestamp;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A notice that could not be delivered after a match finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationFailure {
    pub user_id: UserId,
    pub reason: String,
}

/// Result of a score submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScoreOutcome {
    /// Vote recorded, the other team has not confirmed this score yet
    Pending { record: Match, tentative: Score },
    /// Both teams agreed, ratings are applied and the match is finished
    Finalized {
        record: Match,
        score: Score,
        rating_changes: Vec<RatingChange>,
        notification_failures: Vec<NotificationFailure>,
    },
}

impl ScoreOutcome {
    pub fn record(&self) -> &Match {
        match self {
            ScoreOutcome::Pending { record, .. } => record,
            ScoreOutcome::Finalized { record, .. } => record,
        }
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self, ScoreOutcome::Finalized { .. })
    }
}

/// A vote as stored, plus whether it closed the agreement
#[derive(Debug, Clone)]
pub struct RecordedVote {
    pub vote: ScoreVote,
    pub consensus: bool,
}

/// Record `user_id`'s proposal and check it against the opposing team's vote
pub async fn record_vote(
    tx: &mut dyn StoreTransaction,
    record: &Match,
    user_id: UserId,
    score: Score,
) -> Result<RecordedVote> {
    let membership = tx
        .get_membership(record.id, user_id)
        .await?
        .ok_or_else(|| MatchError::Forbidden {
            user_id: user_id.to_string(),
            reason: "only match members may submit a score".to_string(),
        })?;
    let team = membership.team;

    if tx
        .has_different_voter_for_team(record.id, team, user_id)
        .await?
    {
        return Err(MatchError::ConflictingVoter {
            match_id: record.id.to_string(),
            team,
        });
    }

    let vote = ScoreVote {
        match_id: record.id,
        user_id,
        team,
        score,
        submitted_at: current_timestamp(),
    };
    tx.upsert_vote(&vote).await?;

    let consensus = tx
        .has_opposing_vote_with_score(record.id, team, score)
        .await?;

    debug!(
        match_id = %record.id,
        user_id = %user_id,
        team = %team,
        score = %score,
        consensus,
        "Recorded score vote"
    );
    Ok(RecordedVote { vote, consensus })
}
