//! Applies rating changes for a finished match
//!
//! The engine never commits. It reads and writes through the caller's
//! transaction so that the state transition and every rating write land
//! together or not at all.

use crate::error::{MatchError, Result};
use crate::rating::elo::EloCalculator;
use crate::store::StoreTransaction;
use crate::types::{
    Match, RatingChange, RatingEntry, RatingKey, Score, Team, TeamMembership, UserId,
};
use crate::utils::current_timestamp;
use std::collections::HashMap;
use tracing::{debug, info};

/// Rating engine bound to one calculator configuration
#[derive(Debug, Clone, Default)]
pub struct RatingEngine {
    calculator: EloCalculator,
}

impl RatingEngine {
    pub fn new(calculator: EloCalculator) -> Self {
        Self { calculator }
    }

    pub fn calculator(&self) -> &EloCalculator {
        &self.calculator
    }

    /// Load the rating for `key`, creating it at the initial rating if absent
    pub async fn ensure_entry(
        &self,
        tx: &mut dyn StoreTransaction,
        key: RatingKey,
    ) -> Result<RatingEntry> {
        if let Some(entry) = tx.get_rating(&key).await? {
            return Ok(entry);
        }

        // A concurrent transaction may have created the row since the read
        let initial = RatingEntry::new(key, self.calculator.initial_rating());
        let entry = tx.insert_rating_if_absent(&initial).await?;
        debug!(
            user_id = %key.user_id,
            court_id = %key.court_id,
            sport = %key.sport,
            elo = entry.elo,
            "Ensured rating entry"
        );
        Ok(entry)
    }

    /// Compute and write back new ratings for every participant of `record`
    pub async fn apply_result(
        &self,
        tx: &mut dyn StoreTransaction,
        record: &Match,
        score: Score,
    ) -> Result<Vec<RatingChange>> {
        let members1 = tx.list_members_by_team(record.id, Team::One).await?;
        let members2 = tx.list_members_by_team(record.id, Team::Two).await?;
        let mut ratings = self
            .lock_ratings(tx, record, members1.iter().chain(&members2))
            .await?;

        let team1 = take_team(&mut ratings, members1);
        let team2 = take_team(&mut ratings, members2);

        let ratings1: Vec<i32> = team1.iter().map(|(_, entry)| entry.elo).collect();
        let ratings2: Vec<i32> = team2.iter().map(|(_, entry)| entry.elo).collect();
        let deltas = self.calculator.team_deltas(&ratings1, &ratings2, score);

        info!(
            match_id = %record.id,
            score = %score,
            average1 = deltas.average1,
            average2 = deltas.average2,
            delta1 = deltas.delta1,
            delta2 = deltas.delta2,
            "Applying rating changes"
        );

        let now = current_timestamp();
        let mut changes = Vec::with_capacity(team1.len() + team2.len());
        for (membership, mut entry) in team1.into_iter().chain(team2) {
            let delta = deltas.for_team(membership.team);
            let old_elo = entry.elo;
            entry.elo = old_elo + delta;
            entry.updated_at = now;
            tx.put_rating(&entry).await?;

            changes.push(RatingChange {
                user_id: membership.user_id,
                team: membership.team,
                old_elo,
                new_elo: entry.elo,
                delta,
            });
        }

        Ok(changes)
    }

    /// Load every participant's rating in user id order.
    ///
    /// Backends that lock rating rows take the locks in that order, so two
    /// matches sharing players on the same court and sport never wait on each
    /// other in a cycle.
    async fn lock_ratings<'a>(
        &self,
        tx: &mut dyn StoreTransaction,
        record: &Match,
        members: impl Iterator<Item = &'a TeamMembership>,
    ) -> Result<HashMap<UserId, RatingEntry>> {
        let mut user_ids: Vec<UserId> = members.map(|m| m.user_id).collect();
        user_ids.sort_unstable();
        user_ids.dedup();

        let mut loaded = HashMap::with_capacity(user_ids.len());
        for user_id in user_ids {
            let key = RatingKey::new(user_id, record.court_id, record.sport);
            let entry = tx.get_rating(&key).await?.ok_or_else(|| {
                MatchError::InvariantViolation {
                    message: format!(
                        "no rating for user {} on court {} ({}) in match {}",
                        key.user_id, key.court_id, key.sport, record.id
                    ),
                }
            })?;
            loaded.insert(user_id, entry);
        }

        Ok(loaded)
    }
}

fn take_team(
    ratings: &mut HashMap<UserId, RatingEntry>,
    members: Vec<TeamMembership>,
) -> Vec<(TeamMembership, RatingEntry)> {
    members
        .into_iter()
        .filter_map(|membership| {
            let entry = ratings.remove(&membership.user_id)?;
            Some((membership, entry))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::scripted::ScriptedStore;
    use crate::store::{InMemoryMatchStore, MatchStore};
    use crate::types::{MatchState, Sport};
    use std::sync::atomic::Ordering;
    use uuid::Uuid;

    async fn seed_match(
        tx: &mut dyn StoreTransaction,
        engine: &RatingEngine,
        roster: &[(Uuid, Team)],
    ) -> Match {
        let now = current_timestamp();
        let record = Match {
            id: Uuid::new_v4(),
            sport: Sport::Football,
            scheduled_at: Some(now),
            participant_count: roster.len() as u32,
            state: MatchState::AwaitingScore,
            score1: None,
            score2: None,
            court_id: Uuid::new_v4(),
            creator_id: roster[0].0,
            created_at: now,
            updated_at: now,
        };
        tx.upsert_match(&record).await.unwrap();
        for (user_id, team) in roster {
            tx.add_member(&TeamMembership {
                user_id: *user_id,
                match_id: record.id,
                team: *team,
                joined_at: now,
            })
            .await
            .unwrap();
            engine
                .ensure_entry(tx, RatingKey::new(*user_id, record.court_id, record.sport))
                .await
                .unwrap();
        }
        record
    }

    #[tokio::test]
    async fn test_ensure_entry_is_idempotent() {
        let store = InMemoryMatchStore::new();
        let engine = RatingEngine::default();
        let key = RatingKey::new(Uuid::new_v4(), Uuid::new_v4(), Sport::Basketball);
        let mut tx = store.begin().await.unwrap();

        let first = engine.ensure_entry(tx.as_mut(), key).await.unwrap();
        assert_eq!(first.elo, 1000);

        let mut bumped = first.clone();
        bumped.elo = 1100;
        tx.put_rating(&bumped).await.unwrap();

        let second = engine.ensure_entry(tx.as_mut(), key).await.unwrap();
        assert_eq!(second.elo, 1100);
    }

    #[tokio::test]
    async fn test_apply_result_updates_every_participant() {
        let store = InMemoryMatchStore::new();
        let engine = RatingEngine::default();
        let roster: Vec<(Uuid, Team)> = vec![
            (Uuid::new_v4(), Team::One),
            (Uuid::new_v4(), Team::One),
            (Uuid::new_v4(), Team::Two),
            (Uuid::new_v4(), Team::Two),
        ];
        let mut tx = store.begin().await.unwrap();
        let record = seed_match(tx.as_mut(), &engine, &roster).await;

        let changes = engine
            .apply_result(tx.as_mut(), &record, Score::new(5, 3))
            .await
            .unwrap();
        assert_eq!(changes.len(), 4);

        for (user_id, team) in &roster {
            let key = RatingKey::new(*user_id, record.court_id, record.sport);
            let entry = tx.get_rating(&key).await.unwrap().unwrap();
            let expected = if *team == Team::One { 1016 } else { 984 };
            assert_eq!(entry.elo, expected);
        }
    }

    #[tokio::test]
    async fn test_missing_entry_aborts_without_writes() {
        let store = InMemoryMatchStore::new();
        let engine = RatingEngine::default();
        let roster = vec![(Uuid::new_v4(), Team::One), (Uuid::new_v4(), Team::Two)];

        let record = {
            let mut tx = store.begin().await.unwrap();
            let record = seed_match(tx.as_mut(), &engine, &roster).await;
            tx.commit().await.unwrap();
            record
        };
        let missing = RatingKey::new(roster[1].0, record.court_id, record.sport);
        assert!(store.remove_rating(&missing).await);

        let mut tx = store.begin().await.unwrap();
        let err = engine
            .apply_result(tx.as_mut(), &record, Score::new(1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::InvariantViolation { .. }));

        let present = RatingKey::new(roster[0].0, record.court_id, record.sport);
        assert_eq!(tx.get_rating(&present).await.unwrap().unwrap().elo, 1000);
    }

    #[tokio::test]
    async fn test_ensure_entry_keeps_row_created_after_its_read() {
        let store = ScriptedStore::default();
        let engine = RatingEngine::default();
        let key = RatingKey::new(Uuid::new_v4(), Uuid::new_v4(), Sport::Football);
        {
            let mut tx = store.inner.begin().await.unwrap();
            tx.put_rating(&RatingEntry::new(key, 1016)).await.unwrap();
            tx.commit().await.unwrap();
        }

        // The first read misses the row, as it would before a concurrent
        // insert and finalization committed
        store.script.hide_ratings.store(true, Ordering::SeqCst);
        let mut tx = store.begin().await.unwrap();
        let entry = engine.ensure_entry(tx.as_mut(), key).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(entry.elo, 1016);

        let mut tx = store.inner.begin().await.unwrap();
        assert_eq!(tx.get_rating(&key).await.unwrap().unwrap().elo, 1016);
    }

    #[tokio::test]
    async fn test_apply_result_reads_ratings_in_user_order() {
        let store = ScriptedStore::default();
        let engine = RatingEngine::default();
        let roster: Vec<(Uuid, Team)> = vec![
            (Uuid::new_v4(), Team::One),
            (Uuid::new_v4(), Team::Two),
            (Uuid::new_v4(), Team::One),
            (Uuid::new_v4(), Team::Two),
            (Uuid::new_v4(), Team::One),
            (Uuid::new_v4(), Team::Two),
        ];
        let mut tx = store.begin().await.unwrap();
        let record = seed_match(tx.as_mut(), &engine, &roster).await;
        store.script.clear_rating_reads();

        let changes = engine
            .apply_result(tx.as_mut(), &record, Score::new(2, 1))
            .await
            .unwrap();
        assert_eq!(changes.len(), 6);

        let mut sorted: Vec<Uuid> = roster.iter().map(|(user_id, _)| *user_id).collect();
        sorted.sort();
        assert_eq!(store.script.rating_reads(), sorted);

        for change in &changes {
            let expected = if change.team == Team::One { 16 } else { -16 };
            assert_eq!(change.delta, expected);
        }
    }
}
