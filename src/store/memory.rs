//! In-memory store implementation
//!
//! All tables live behind a single async mutex. A transaction owns the lock for
//! its whole lifetime. Reads go straight to the locked tables; the first write
//! takes a working copy, which is swapped in on commit and discarded otherwise.
//! Every transaction is therefore serializable, at the price of no parallelism
//! between unrelated matches.

use crate::error::{MatchError, Result};
use crate::store::{MatchStore, StoreTransaction};
use crate::types::{
    Court, CourtId, Match, MatchFilter, MatchId, MatchPatch, RatingEntry, RatingKey, Score,
    ScoreVote, Sport, Team, TeamMembership, UserId, UserProfile,
};
use crate::utils::current_timestamp;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct Tables {
    courts: HashMap<CourtId, Court>,
    users: HashMap<UserId, UserProfile>,
    matches: HashMap<MatchId, Match>,
    memberships: HashMap<(MatchId, UserId), TeamMembership>,
    votes: HashMap<(MatchId, UserId), ScoreVote>,
    ratings: HashMap<RatingKey, RatingEntry>,
}

/// Store backed by process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryMatchStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a court so matches can be created on it
    pub async fn add_court(&self, court: Court) {
        self.tables.lock().await.courts.insert(court.id, court);
    }

    /// Register a user's contact details for notifications
    pub async fn add_user(&self, user: UserProfile) {
        self.tables.lock().await.users.insert(user.id, user);
    }

    /// Drop a rating row outside any transaction (for testing)
    pub async fn remove_rating(&self, key: &RatingKey) -> bool {
        self.tables.lock().await.ratings.remove(key).is_some()
    }
}

#[async_trait]
impl MatchStore for InMemoryMatchStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(self.open().await))
    }
}

impl InMemoryMatchStore {
    async fn open(&self) -> InMemoryTransaction {
        let guard = self.tables.clone().lock_owned().await;
        InMemoryTransaction {
            guard,
            working: None,
        }
    }
}

/// Transaction over the in-memory tables
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Option<Tables>,
}

impl InMemoryTransaction {
    fn read(&self) -> &Tables {
        self.working.as_ref().unwrap_or(&*self.guard)
    }

    fn write(&mut self) -> &mut Tables {
        let guard = &self.guard;
        self.working.get_or_insert_with(|| (**guard).clone())
    }

    fn members(&self, match_id: MatchId) -> impl Iterator<Item = &TeamMembership> {
        self.read()
            .memberships
            .values()
            .filter(move |m| m.match_id == match_id)
    }

    fn votes(&self, match_id: MatchId) -> impl Iterator<Item = &ScoreVote> {
        self.read()
            .votes
            .values()
            .filter(move |v| v.match_id == match_id)
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn get_court(&mut self, court_id: CourtId) -> Result<Option<Court>> {
        Ok(self.read().courts.get(&court_id).cloned())
    }

    async fn get_user(&mut self, user_id: UserId) -> Result<Option<UserProfile>> {
        Ok(self.read().users.get(&user_id).cloned())
    }

    async fn get_match(&mut self, match_id: MatchId) -> Result<Option<Match>> {
        Ok(self.read().matches.get(&match_id).cloned())
    }

    async fn upsert_match(&mut self, record: &Match) -> Result<()> {
        self.write().matches.insert(record.id, record.clone());
        Ok(())
    }

    async fn patch_match(
        &mut self,
        match_id: MatchId,
        patch: &MatchPatch,
    ) -> Result<Option<Match>> {
        Ok(self.write().matches.get_mut(&match_id).map(|m| {
            m.apply(patch, current_timestamp());
            m.clone()
        }))
    }

    async fn delete_match(&mut self, match_id: MatchId) -> Result<bool> {
        let removed = self.write().matches.remove(&match_id).is_some();
        self.write()
            .memberships
            .retain(|(m, _), _| *m != match_id);
        self.write().votes.retain(|(m, _), _| *m != match_id);
        Ok(removed)
    }

    async fn list_matches(&mut self, filter: &MatchFilter) -> Result<Vec<Match>> {
        let mut matches: Vec<Match> = self
            .read()
            .matches
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    }

    async fn count_team_members(&mut self, match_id: MatchId, team: Team) -> Result<u32> {
        Ok(self.members(match_id).filter(|m| m.team == team).count() as u32)
    }

    async fn count_all_members(&mut self, match_id: MatchId) -> Result<u32> {
        Ok(self.members(match_id).count() as u32)
    }

    async fn is_member(&mut self, match_id: MatchId, user_id: UserId) -> Result<bool> {
        Ok(self.read().memberships.contains_key(&(match_id, user_id)))
    }

    async fn get_membership(
        &mut self,
        match_id: MatchId,
        user_id: UserId,
    ) -> Result<Option<TeamMembership>> {
        Ok(self.read().memberships.get(&(match_id, user_id)).cloned())
    }

    async fn add_member(&mut self, membership: &TeamMembership) -> Result<()> {
        let key = (membership.match_id, membership.user_id);
        if self.read().memberships.contains_key(&key) {
            return Err(MatchError::AlreadyMember {
                match_id: membership.match_id.to_string(),
                user_id: membership.user_id.to_string(),
            });
        }
        self.write().memberships.insert(key, membership.clone());
        Ok(())
    }

    async fn list_members_by_team(
        &mut self,
        match_id: MatchId,
        team: Team,
    ) -> Result<Vec<TeamMembership>> {
        let mut members: Vec<TeamMembership> = self
            .members(match_id)
            .filter(|m| m.team == team)
            .cloned()
            .collect();
        members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        Ok(members)
    }

    async fn get_vote(&mut self, match_id: MatchId, user_id: UserId) -> Result<Option<ScoreVote>> {
        Ok(self.read().votes.get(&(match_id, user_id)).cloned())
    }

    async fn get_vote_by_team(
        &mut self,
        match_id: MatchId,
        team: Team,
    ) -> Result<Option<ScoreVote>> {
        Ok(self.votes(match_id).find(|v| v.team == team).cloned())
    }

    async fn upsert_vote(&mut self, vote: &ScoreVote) -> Result<()> {
        self.write()
            .votes
            .insert((vote.match_id, vote.user_id), vote.clone());
        Ok(())
    }

    async fn has_opposing_vote_with_score(
        &mut self,
        match_id: MatchId,
        team: Team,
        score: Score,
    ) -> Result<bool> {
        let opponent = team.opponent();
        Ok(self
            .votes(match_id)
            .any(|v| v.team == opponent && v.score == score))
    }

    async fn has_different_voter_for_team(
        &mut self,
        match_id: MatchId,
        team: Team,
        user_id: UserId,
    ) -> Result<bool> {
        Ok(self
            .votes(match_id)
            .any(|v| v.team == team && v.user_id != user_id))
    }

    async fn get_rating(&mut self, key: &RatingKey) -> Result<Option<RatingEntry>> {
        Ok(self.read().ratings.get(key).cloned())
    }

    async fn put_rating(&mut self, entry: &RatingEntry) -> Result<()> {
        self.write().ratings.insert(entry.key(), entry.clone());
        Ok(())
    }

    async fn insert_rating_if_absent(&mut self, entry: &RatingEntry) -> Result<RatingEntry> {
        if let Some(existing) = self.read().ratings.get(&entry.key()) {
            return Ok(existing.clone());
        }
        self.write().ratings.insert(entry.key(), entry.clone());
        Ok(entry.clone())
    }

    async fn list_ratings(
        &mut self,
        court_id: CourtId,
        sport: Sport,
        limit: usize,
    ) -> Result<Vec<RatingEntry>> {
        let mut entries: Vec<RatingEntry> = self
            .read()
            .ratings
            .values()
            .filter(|r| r.court_id == court_id && r.sport == sport)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.elo.cmp(&a.elo).then(a.user_id.cmp(&b.user_id)));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTransaction { mut guard, working } = *self;
        if let Some(working) = working {
            *guard = working;
        }
        Ok(())
    }
}
