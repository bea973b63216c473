//! Persistence interface for matches, memberships, score votes and ratings
//!
//! The engine keeps no authoritative state of its own. Every operation opens a
//! `StoreTransaction`, reloads what it needs, and either commits or drops the
//! transaction. Dropping an uncommitted transaction discards all of its writes.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(test)]
pub(crate) mod scripted;

use crate::error::Result;
use crate::types::{
    Court, CourtId, Match, MatchFilter, MatchId, MatchPatch, RatingEntry, RatingKey, Score,
    ScoreVote, Sport, Team, TeamMembership, UserId, UserProfile,
};
use async_trait::async_trait;

pub use memory::InMemoryMatchStore;
#[cfg(feature = "postgres")]
pub use postgres::PgMatchStore;

/// Entry point to the store: hands out transactions
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Open a transaction. Reads and writes made through it are isolated from
    /// concurrent transactions touching the same match or rating rows.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;
}

/// Unit of work against the store
#[async_trait]
pub trait StoreTransaction: Send {
    async fn get_court(&mut self, court_id: CourtId) -> Result<Option<Court>>;

    async fn get_user(&mut self, user_id: UserId) -> Result<Option<UserProfile>>;

    /// Load a match. Backends that lock rows lock the match row here, which
    /// serializes every read-modify-write on the same match.
    async fn get_match(&mut self, match_id: MatchId) -> Result<Option<Match>>;

    async fn upsert_match(&mut self, record: &Match) -> Result<()>;

    /// Apply a partial update and return the updated match, `None` if absent
    async fn patch_match(&mut self, match_id: MatchId, patch: &MatchPatch)
        -> Result<Option<Match>>;

    /// Remove a match with its memberships and votes
    async fn delete_match(&mut self, match_id: MatchId) -> Result<bool>;

    /// Matches satisfying the filter, newest first
    async fn list_matches(&mut self, filter: &MatchFilter) -> Result<Vec<Match>>;

    async fn count_team_members(&mut self, match_id: MatchId, team: Team) -> Result<u32>;

    async fn count_all_members(&mut self, match_id: MatchId) -> Result<u32>;

    async fn is_member(&mut self, match_id: MatchId, user_id: UserId) -> Result<bool>;

    async fn get_membership(
        &mut self,
        match_id: MatchId,
        user_id: UserId,
    ) -> Result<Option<TeamMembership>>;

    /// Insert a membership. Fails with `AlreadyMember` if (match, user) exists.
    async fn add_member(&mut self, membership: &TeamMembership) -> Result<()>;

    /// Members of one team ordered by join time
    async fn list_members_by_team(
        &mut self,
        match_id: MatchId,
        team: Team,
    ) -> Result<Vec<TeamMembership>>;

    async fn get_vote(&mut self, match_id: MatchId, user_id: UserId) -> Result<Option<ScoreVote>>;

    async fn get_vote_by_team(&mut self, match_id: MatchId, team: Team)
        -> Result<Option<ScoreVote>>;

    /// Insert or overwrite the vote keyed by (match, user)
    async fn upsert_vote(&mut self, vote: &ScoreVote) -> Result<()>;

    /// Whether the team opposing `team` has a vote equal to `score`
    async fn has_opposing_vote_with_score(
        &mut self,
        match_id: MatchId,
        team: Team,
        score: Score,
    ) -> Result<bool>;

    /// Whether someone other than `user_id` already voted for `team`
    async fn has_different_voter_for_team(
        &mut self,
        match_id: MatchId,
        team: Team,
        user_id: UserId,
    ) -> Result<bool>;

    /// Load a rating. Backends that lock rows lock the rating row here.
    async fn get_rating(&mut self, key: &RatingKey) -> Result<Option<RatingEntry>>;

    /// Write back a rating, overwriting any existing row
    async fn put_rating(&mut self, entry: &RatingEntry) -> Result<()>;

    /// Insert `entry` unless a row for its key exists, then return the stored
    /// row. An existing row is never overwritten and comes back locked.
    async fn insert_rating_if_absent(&mut self, entry: &RatingEntry) -> Result<RatingEntry>;

    /// Ratings for a court and sport, highest first
    async fn list_ratings(
        &mut self,
        court_id: CourtId,
        sport: Sport,
        limit: usize,
    ) -> Result<Vec<RatingEntry>>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
