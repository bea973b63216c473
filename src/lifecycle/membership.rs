//! Team seating and capacity
//!
//! The capacity check and the insert run inside the caller's transaction, which
//! holds the match row for its whole duration. Two joiners racing for the last
//! seat of a team are therefore serialized, and the loser sees the recount.

use crate::error::{MatchError, Result};
use crate::store::StoreTransaction;
use crate::types::{Match, Team, TeamMembership, UserId};
use crate::utils::current_timestamp;
use tracing::debug;

/// Seat `user_id` on `team`, enforcing uniqueness and team capacity
pub async fn seat_member(
    tx: &mut dyn StoreTransaction,
    record: &Match,
    user_id: UserId,
    team: Team,
) -> Result<TeamMembership> {
    if tx.is_member(record.id, user_id).await? {
        return Err(MatchError::AlreadyMember {
            match_id: record.id.to_string(),
            user_id: user_id.to_string(),
        });
    }

    let capacity = record.capacity();
    let occupancy = tx.count_team_members(record.id, team).await?;
    if occupancy >= capacity {
        return Err(MatchError::CapacityExceeded {
            match_id: record.id.to_string(),
            team,
            capacity,
        });
    }

    let membership = TeamMembership {
        user_id,
        match_id: record.id,
        team,
        joined_at: current_timestamp(),
    };
    tx.add_member(&membership).await?;

    debug!(
        match_id = %record.id,
        user_id = %user_id,
        team = %team,
        occupancy = occupancy + 1,
        capacity,
        "Seated member"
    );
    Ok(membership)
}

/// Whether every seat of the match is taken
pub async fn is_full(tx: &mut dyn StoreTransaction, record: &Match) -> Result<bool> {
    Ok(tx.count_all_members(record.id).await? >= record.participant_count)
}
