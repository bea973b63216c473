//! Store wrapper for tests that need to see or bend what a transaction does
//!
//! Wraps the in-memory store. It can hide rating rows from `get_rating`, as a
//! read that ran before a concurrent insert committed would, record the order
//! rating rows are read in, and fail every commit.

use crate::error::{MatchError, Result};
use crate::store::{InMemoryMatchStore, MatchStore, StoreTransaction};
use crate::types::{
    Court, CourtId, Match, MatchFilter, MatchId, MatchPatch, RatingEntry, RatingKey, Score,
    ScoreVote, Sport, Team, TeamMembership, UserId, UserProfile,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub(crate) struct Script {
    pub hide_ratings: AtomicBool,
    pub fail_commit: AtomicBool,
    rating_reads: Mutex<Vec<UserId>>,
}

impl Script {
    pub fn rating_reads(&self) -> Vec<UserId> {
        self.rating_reads.lock().unwrap().clone()
    }

    pub fn clear_rating_reads(&self) {
        self.rating_reads.lock().unwrap().clear();
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedStore {
    pub inner: InMemoryMatchStore,
    pub script: Arc<Script>,
}

#[async_trait]
impl MatchStore for ScriptedStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(ScriptedTransaction {
            inner: self.inner.begin().await?,
            script: self.script.clone(),
        }))
    }
}

struct ScriptedTransaction {
    inner: Box<dyn StoreTransaction>,
    script: Arc<Script>,
}

#[async_trait]
impl StoreTransaction for ScriptedTransaction {
    async fn get_court(&mut self, court_id: CourtId) -> Result<Option<Court>> {
        self.inner.get_court(court_id).await
    }

    async fn get_user(&mut self, user_id: UserId) -> Result<Option<UserProfile>> {
        self.inner.get_user(user_id).await
    }

    async fn get_match(&mut self, match_id: MatchId) -> Result<Option<Match>> {
        self.inner.get_match(match_id).await
    }

    async fn upsert_match(&mut self, record: &Match) -> Result<()> {
        self.inner.upsert_match(record).await
    }

    async fn patch_match(
        &mut self,
        match_id: MatchId,
        patch: &MatchPatch,
    ) -> Result<Option<Match>> {
        self.inner.patch_match(match_id, patch).await
    }

    async fn delete_match(&mut self, match_id: MatchId) -> Result<bool> {
        self.inner.delete_match(match_id).await
    }

    async fn list_matches(&mut self, filter: &MatchFilter) -> Result<Vec<Match>> {
        self.inner.list_matches(filter).await
    }

    async fn count_team_members(&mut self, match_id: MatchId, team: Team) -> Result<u32> {
        self.inner.count_team_members(match_id, team).await
    }

    async fn count_all_members(&mut self, match_id: MatchId) -> Result<u32> {
        self.inner.count_all_members(match_id).await
    }

    async fn is_member(&mut self, match_id: MatchId, user_id: UserId) -> Result<bool> {
        self.inner.is_member(match_id, user_id).await
    }

    async fn get_membership(
        &mut self,
        match_id: MatchId,
        user_id: UserId,
    ) -> Result<Option<TeamMembership>> {
        self.inner.get_membership(match_id, user_id).await
    }

    async fn add_member(&mut self, membership: &TeamMembership) -> Result<()> {
        self.inner.add_member(membership).await
    }

    async fn list_members_by_team(
        &mut self,
        match_id: MatchId,
        team: Team,
    ) -> Result<Vec<TeamMembership>> {
        self.inner.list_members_by_team(match_id, team).await
    }

    async fn get_vote(&mut self, match_id: MatchId, user_id: UserId) -> Result<Option<ScoreVote>> {
        self.inner.get_vote(match_id, user_id).await
    }

    async fn get_vote_by_team(
        &mut self,
        match_id: MatchId,
        team: Team,
    ) -> Result<Option<ScoreVote>> {
        self.inner.get_vote_by_team(match_id, team).await
    }

    async fn upsert_vote(&mut self, vote: &ScoreVote) -> Result<()> {
        self.inner.upsert_vote(vote).await
    }

    async fn has_opposing_vote_with_score(
        &mut self,
        match_id: MatchId,
        team: Team,
        score: Score,
    ) -> Result<bool> {
        self.inner
            .has_opposing_vote_with_score(match_id, team, score)
            .await
    }

    async fn has_different_voter_for_team(
        &mut self,
        match_id: MatchId,
        team: Team,
        user_id: UserId,
    ) -> Result<bool> {
        self.inner
            .has_different_voter_for_team(match_id, team, user_id)
            .await
    }

    async fn get_rating(&mut self, key: &RatingKey) -> Result<Option<RatingEntry>> {
        self.script.rating_reads.lock().unwrap().push(key.user_id);
        if self.script.hide_ratings.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.get_rating(key).await
    }

    async fn put_rating(&mut self, entry: &RatingEntry) -> Result<()> {
        self.inner.put_rating(entry).await
    }

    async fn insert_rating_if_absent(&mut self, entry: &RatingEntry) -> Result<RatingEntry> {
        self.inner.insert_rating_if_absent(entry).await
    }

    async fn list_ratings(
        &mut self,
        court_id: CourtId,
        sport: Sport,
        limit: usize,
    ) -> Result<Vec<RatingEntry>> {
        self.inner.list_ratings(court_id, sport, limit).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.script.fail_commit.load(Ordering::SeqCst) {
            return Err(MatchError::DependencyFailure {
                message: "commit rejected".to_string(),
            });
        }
        self.inner.commit().await
    }
}
