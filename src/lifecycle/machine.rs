//! Match state machine guards
//!
//! A match only ever moves to `MatchState::next()`. Every transition is written
//! as a single `MatchPatch` so the state change and any field updates that go
//! with it land in one store call.

use crate::error::{MatchError, Result};
use crate::store::StoreTransaction;
use crate::types::{Match, MatchId, MatchPatch, MatchState, UserId};

/// Load a match or fail with `NotFound`
pub async fn load_match(tx: &mut dyn StoreTransaction, match_id: MatchId) -> Result<Match> {
    tx.get_match(match_id)
        .await?
        .ok_or_else(|| MatchError::match_not_found(match_id))
}

/// Fail with `InvalidState` unless the match is in `expected`
pub fn ensure_state(record: &Match, expected: MatchState, operation: &'static str) -> Result<()> {
    ensure_state_in(record, &[expected], operation)
}

/// Fail with `InvalidState` unless the match is in one of `allowed`
pub fn ensure_state_in(
    record: &Match,
    allowed: &[MatchState],
    operation: &'static str,
) -> Result<()> {
    if allowed.contains(&record.state) {
        Ok(())
    } else {
        Err(MatchError::InvalidState {
            match_id: record.id.to_string(),
            state: record.state,
            operation,
        })
    }
}

/// Only the creator, while still seated, may drive the match forward
pub async fn ensure_creator_member(
    tx: &mut dyn StoreTransaction,
    record: &Match,
    user_id: UserId,
    operation: &'static str,
) -> Result<()> {
    if record.creator_id != user_id {
        return Err(MatchError::Forbidden {
            user_id: user_id.to_string(),
            reason: format!("only the match creator may {}", operation),
        });
    }
    if !tx.is_member(record.id, user_id).await? {
        return Err(MatchError::Forbidden {
            user_id: user_id.to_string(),
            reason: format!("the creator must be a match member to {}", operation),
        });
    }
    Ok(())
}

/// Move the match to its successor state, applying `extra` in the same write
pub async fn advance(
    tx: &mut dyn StoreTransaction,
    record: &Match,
    extra: MatchPatch,
    operation: &'static str,
) -> Result<Match> {
    let next = record.state.next().ok_or_else(|| MatchError::InvalidState {
        match_id: record.id.to_string(),
        state: record.state,
        operation,
    })?;

    let patch = MatchPatch {
        state: Some(next),
        ..extra
    };
    tx.patch_match(record.id, &patch)
        .await?
        .ok_or_else(|| MatchError::match_not_found(record.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryMatchStore, MatchStore};
    use crate::types::{Sport, Team, TeamMembership};
    use crate::utils::current_timestamp;
    use uuid::Uuid;

    fn record(state: MatchState) -> Match {
        let now = current_timestamp();
        Match {
            id: Uuid::new_v4(),
            sport: Sport::PingPong,
            scheduled_at: None,
            participant_count: 2,
            state,
            score1: None,
            score2: None,
            court_id: Uuid::new_v4(),
            creator_id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_ensure_state() {
        let m = record(MatchState::Ready);
        assert!(ensure_state(&m, MatchState::Ready, "start").is_ok());

        let err = ensure_state(&m, MatchState::InProgress, "finish").unwrap_err();
        assert_eq!(
            err,
            MatchError::InvalidState {
                match_id: m.id.to_string(),
                state: MatchState::Ready,
                operation: "finish",
            }
        );
        assert!(ensure_state_in(
            &m,
            &[MatchState::AwaitingPlayers, MatchState::Ready],
            "update"
        )
        .is_ok());
    }

    #[tokio::test]
    async fn test_advance_follows_successor() {
        let store = InMemoryMatchStore::new();
        let mut tx = store.begin().await.unwrap();
        let m = record(MatchState::InProgress);
        tx.upsert_match(&m).await.unwrap();

        let advanced = advance(tx.as_mut(), &m, MatchPatch::default(), "finish")
            .await
            .unwrap();
        assert_eq!(advanced.state, MatchState::AwaitingScore);

        let finished = record(MatchState::Finished);
        tx.upsert_match(&finished).await.unwrap();
        let err = advance(tx.as_mut(), &finished, MatchPatch::default(), "finish")
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_creator_checks() {
        let store = InMemoryMatchStore::new();
        let mut tx = store.begin().await.unwrap();
        let m = record(MatchState::Ready);
        tx.upsert_match(&m).await.unwrap();

        // Creator not seated yet
        let err = ensure_creator_member(tx.as_mut(), &m, m.creator_id, "start")
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::Forbidden { .. }));

        tx.add_member(&TeamMembership {
            user_id: m.creator_id,
            match_id: m.id,
            team: Team::One,
            joined_at: current_timestamp(),
        })
        .await
        .unwrap();
        assert!(ensure_creator_member(tx.as_mut(), &m, m.creator_id, "start")
            .await
            .is_ok());

        let err = ensure_creator_member(tx.as_mut(), &m, Uuid::new_v4(), "start")
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::Forbidden { .. }));
    }
}
