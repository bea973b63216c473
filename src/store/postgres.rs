//! PostgreSQL store backed by `sqlx`
//!
//! Every `StoreTransaction` is a database transaction. `get_match` and
//! `get_rating` take row locks (`FOR UPDATE`), so concurrent operations on the
//! same match, or on the same (user, court, sport) rating, run one after the
//! other. Memberships and votes are keyed by (match_id, user_id).

use crate::error::{MatchError, Result};
use crate::store::{MatchStore, StoreTransaction};
use crate::types::{
    Court, CourtId, Match, MatchFilter, MatchId, MatchPatch, RatingEntry, RatingKey, Score,
    ScoreVote, Sport, Team, TeamMembership, UserId, UserProfile,
};
use crate::utils::current_timestamp;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const MATCH_COLUMNS: &str = "id, sport, scheduled_at, participant_count, state, score1, score2, \
                             court_id, creator_id, created_at, updated_at";

type MatchRow = (
    Uuid,
    String,
    Option<DateTime<Utc>>,
    i32,
    String,
    Option<i32>,
    Option<i32>,
    Uuid,
    Uuid,
    DateTime<Utc>,
    DateTime<Utc>,
);

type MembershipRow = (Uuid, Uuid, i16, DateTime<Utc>);

type VoteRow = (Uuid, Uuid, i16, i32, i32, DateTime<Utc>);

type RatingRow = (Uuid, Uuid, String, i32, DateTime<Utc>);

/// Connection pool handing out database transactions
#[derive(Clone)]
pub struct PgMatchStore {
    pool: PgPool,
}

impl PgMatchStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!(max_connections, "Connected to postgres");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tables if they do not exist yet
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn add_court(&self, court: &Court) -> Result<()> {
        sqlx::query(
            "INSERT INTO courts (id, name) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name",
        )
        .bind(court.id)
        .bind(&court.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_user(&self, user: &UserProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, name, contact) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, contact = EXCLUDED.contact",
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.contact)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MatchStore for PgMatchStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

/// An open database transaction
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

fn parse_column<T: FromStr<Err = MatchError>>(raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|e: MatchError| MatchError::dependency(format!("corrupt row: {}", e)))
}

fn team_from_column(raw: i16) -> Result<Team> {
    u8::try_from(raw)
        .map_err(|_| MatchError::dependency(format!("corrupt row: team {}", raw)))
        .and_then(|n| {
            Team::try_from(n).map_err(|e| MatchError::dependency(format!("corrupt row: {}", e)))
        })
}

fn team_column(team: Team) -> i16 {
    i16::from(team.number())
}

fn match_from_row(row: MatchRow) -> Result<Match> {
    let (
        id,
        sport,
        scheduled_at,
        participant_count,
        state,
        score1,
        score2,
        court_id,
        creator_id,
        created_at,
        updated_at,
    ) = row;
    Ok(Match {
        id,
        sport: parse_column(&sport)?,
        scheduled_at,
        participant_count: u32::try_from(participant_count).map_err(|_| {
            MatchError::dependency(format!("corrupt row: participant count {}", participant_count))
        })?,
        state: parse_column(&state)?,
        score1,
        score2,
        court_id,
        creator_id,
        created_at,
        updated_at,
    })
}

fn membership_from_row(row: MembershipRow) -> Result<TeamMembership> {
    let (match_id, user_id, team, joined_at) = row;
    Ok(TeamMembership {
        user_id,
        match_id,
        team: team_from_column(team)?,
        joined_at,
    })
}

fn vote_from_row(row: VoteRow) -> Result<ScoreVote> {
    let (match_id, user_id, team, score1, score2, submitted_at) = row;
    Ok(ScoreVote {
        match_id,
        user_id,
        team: team_from_column(team)?,
        score: Score::new(score1, score2),
        submitted_at,
    })
}

fn rating_from_row(row: RatingRow) -> Result<RatingEntry> {
    let (user_id, court_id, sport, elo, updated_at) = row;
    Ok(RatingEntry {
        user_id,
        court_id,
        sport: parse_column(&sport)?,
        elo,
        updated_at,
    })
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn get_court(&mut self, court_id: CourtId) -> Result<Option<Court>> {
        let row = sqlx::query_as::<_, (Uuid, String)>("SELECT id, name FROM courts WHERE id = $1")
            .bind(court_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(|(id, name)| Court { id, name }))
    }

    async fn get_user(&mut self, user_id: UserId) -> Result<Option<UserProfile>> {
        let row = sqlx::query_as::<_, (Uuid, String, String)>(
            "SELECT id, name, contact FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(|(id, name, contact)| UserProfile { id, name, contact }))
    }

    async fn get_match(&mut self, match_id: MatchId) -> Result<Option<Match>> {
        let sql = format!("SELECT {} FROM matches WHERE id = $1 FOR UPDATE", MATCH_COLUMNS);
        sqlx::query_as::<_, MatchRow>(&sql)
            .bind(match_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(match_from_row)
            .transpose()
    }

    async fn upsert_match(&mut self, record: &Match) -> Result<()> {
        sqlx::query(
            "INSERT INTO matches (id, sport, scheduled_at, participant_count, state, score1, score2, \
                                  court_id, creator_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (id) DO UPDATE SET \
                 sport = EXCLUDED.sport, scheduled_at = EXCLUDED.scheduled_at, \
                 participant_count = EXCLUDED.participant_count, state = EXCLUDED.state, \
                 score1 = EXCLUDED.score1, score2 = EXCLUDED.score2, \
                 court_id = EXCLUDED.court_id, creator_id = EXCLUDED.creator_id, \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(record.id)
        .bind(record.sport.as_str())
        .bind(record.scheduled_at)
        .bind(record.participant_count as i32)
        .bind(record.state.as_str())
        .bind(record.score1)
        .bind(record.score2)
        .bind(record.court_id)
        .bind(record.creator_id)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn patch_match(
        &mut self,
        match_id: MatchId,
        patch: &MatchPatch,
    ) -> Result<Option<Match>> {
        let sql = format!(
            "UPDATE matches SET \
                 state = COALESCE($2, state), \
                 scheduled_at = COALESCE($3, scheduled_at), \
                 score1 = COALESCE($4, score1), \
                 score2 = COALESCE($5, score2), \
                 updated_at = $6 \
             WHERE id = $1 RETURNING {}",
            MATCH_COLUMNS
        );
        sqlx::query_as::<_, MatchRow>(&sql)
            .bind(match_id)
            .bind(patch.state.map(|s| s.as_str()))
            .bind(patch.scheduled_at)
            .bind(patch.score.map(|s| s.score1))
            .bind(patch.score.map(|s| s.score2))
            .bind(current_timestamp())
            .fetch_optional(&mut *self.tx)
            .await?
            .map(match_from_row)
            .transpose()
    }

    async fn delete_match(&mut self, match_id: MatchId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM matches WHERE id = $1")
            .bind(match_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_matches(&mut self, filter: &MatchFilter) -> Result<Vec<Match>> {
        let sql = format!(
            "SELECT {} FROM matches \
             WHERE ($1::uuid IS NULL OR court_id = $1) \
               AND ($2::text IS NULL OR sport = $2) \
               AND ($3::text IS NULL OR state = $3) \
             ORDER BY created_at DESC",
            MATCH_COLUMNS
        );
        sqlx::query_as::<_, MatchRow>(&sql)
            .bind(filter.court_id)
            .bind(filter.sport.map(|s| s.as_str()))
            .bind(filter.state.map(|s| s.as_str()))
            .fetch_all(&mut *self.tx)
            .await?
            .into_iter()
            .map(match_from_row)
            .collect()
    }

    async fn count_team_members(&mut self, match_id: MatchId, team: Team) -> Result<u32> {
        let (count,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM memberships WHERE match_id = $1 AND team = $2",
        )
        .bind(match_id)
        .bind(team_column(team))
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count as u32)
    }

    async fn count_all_members(&mut self, match_id: MatchId) -> Result<u32> {
        let (count,) =
            sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM memberships WHERE match_id = $1")
                .bind(match_id)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(count as u32)
    }

    async fn is_member(&mut self, match_id: MatchId, user_id: UserId) -> Result<bool> {
        let (exists,) = sqlx::query_as::<_, (bool,)>(
            "SELECT EXISTS (SELECT 1 FROM memberships WHERE match_id = $1 AND user_id = $2)",
        )
        .bind(match_id)
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn get_membership(
        &mut self,
        match_id: MatchId,
        user_id: UserId,
    ) -> Result<Option<TeamMembership>> {
        sqlx::query_as::<_, MembershipRow>(
            "SELECT match_id, user_id, team, joined_at FROM memberships \
             WHERE match_id = $1 AND user_id = $2",
        )
        .bind(match_id)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(membership_from_row)
        .transpose()
    }

    async fn add_member(&mut self, membership: &TeamMembership) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO memberships (match_id, user_id, team, joined_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(membership.match_id)
        .bind(membership.user_id)
        .bind(team_column(membership.team))
        .bind(membership.joined_at)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(MatchError::AlreadyMember {
                    match_id: membership.match_id.to_string(),
                    user_id: membership.user_id.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_members_by_team(
        &mut self,
        match_id: MatchId,
        team: Team,
    ) -> Result<Vec<TeamMembership>> {
        sqlx::query_as::<_, MembershipRow>(
            "SELECT match_id, user_id, team, joined_at FROM memberships \
             WHERE match_id = $1 AND team = $2 ORDER BY joined_at, user_id",
        )
        .bind(match_id)
        .bind(team_column(team))
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(membership_from_row)
        .collect()
    }

    async fn get_vote(&mut self, match_id: MatchId, user_id: UserId) -> Result<Option<ScoreVote>> {
        sqlx::query_as::<_, VoteRow>(
            "SELECT match_id, user_id, team, score1, score2, submitted_at FROM score_votes \
             WHERE match_id = $1 AND user_id = $2",
        )
        .bind(match_id)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(vote_from_row)
        .transpose()
    }

    async fn get_vote_by_team(
        &mut self,
        match_id: MatchId,
        team: Team,
    ) -> Result<Option<ScoreVote>> {
        sqlx::query_as::<_, VoteRow>(
            "SELECT match_id, user_id, team, score1, score2, submitted_at FROM score_votes \
             WHERE match_id = $1 AND team = $2 ORDER BY submitted_at LIMIT 1",
        )
        .bind(match_id)
        .bind(team_column(team))
        .fetch_optional(&mut *self.tx)
        .await?
        .map(vote_from_row)
        .transpose()
    }

    async fn upsert_vote(&mut self, vote: &ScoreVote) -> Result<()> {
        sqlx::query(
            "INSERT INTO score_votes (match_id, user_id, team, score1, score2, submitted_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (match_id, user_id) DO UPDATE SET \
                 team = EXCLUDED.team, score1 = EXCLUDED.score1, score2 = EXCLUDED.score2, \
                 submitted_at = EXCLUDED.submitted_at",
        )
        .bind(vote.match_id)
        .bind(vote.user_id)
        .bind(team_column(vote.team))
        .bind(vote.score.score1)
        .bind(vote.score.score2)
        .bind(vote.submitted_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn has_opposing_vote_with_score(
        &mut self,
        match_id: MatchId,
        team: Team,
        score: Score,
    ) -> Result<bool> {
        let (exists,) = sqlx::query_as::<_, (bool,)>(
            "SELECT EXISTS (SELECT 1 FROM score_votes \
             WHERE match_id = $1 AND team = $2 AND score1 = $3 AND score2 = $4)",
        )
        .bind(match_id)
        .bind(team_column(team.opponent()))
        .bind(score.score1)
        .bind(score.score2)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn has_different_voter_for_team(
        &mut self,
        match_id: MatchId,
        team: Team,
        user_id: UserId,
    ) -> Result<bool> {
        let (exists,) = sqlx::query_as::<_, (bool,)>(
            "SELECT EXISTS (SELECT 1 FROM score_votes \
             WHERE match_id = $1 AND team = $2 AND user_id <> $3)",
        )
        .bind(match_id)
        .bind(team_column(team))
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn get_rating(&mut self, key: &RatingKey) -> Result<Option<RatingEntry>> {
        sqlx::query_as::<_, RatingRow>(
            "SELECT user_id, court_id, sport, elo, updated_at FROM ratings \
             WHERE user_id = $1 AND court_id = $2 AND sport = $3 FOR UPDATE",
        )
        .bind(key.user_id)
        .bind(key.court_id)
        .bind(key.sport.as_str())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(rating_from_row)
        .transpose()
    }

    async fn put_rating(&mut self, entry: &RatingEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO ratings (user_id, court_id, sport, elo, updated_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id, court_id, sport) DO UPDATE SET \
                 elo = EXCLUDED.elo, updated_at = EXCLUDED.updated_at",
        )
        .bind(entry.user_id)
        .bind(entry.court_id)
        .bind(entry.sport.as_str())
        .bind(entry.elo)
        .bind(entry.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_rating_if_absent(&mut self, entry: &RatingEntry) -> Result<RatingEntry> {
        sqlx::query(
            "INSERT INTO ratings (user_id, court_id, sport, elo, updated_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id, court_id, sport) DO NOTHING",
        )
        .bind(entry.user_id)
        .bind(entry.court_id)
        .bind(entry.sport.as_str())
        .bind(entry.elo)
        .bind(entry.updated_at)
        .execute(&mut *self.tx)
        .await?;

        let key = entry.key();
        self.get_rating(&key)
            .await?
            .ok_or_else(|| MatchError::InvariantViolation {
                message: format!(
                    "rating for user {} on court {} ({}) vanished after insert",
                    key.user_id, key.court_id, key.sport
                ),
            })
    }

    async fn list_ratings(
        &mut self,
        court_id: CourtId,
        sport: Sport,
        limit: usize,
    ) -> Result<Vec<RatingEntry>> {
        sqlx::query_as::<_, RatingRow>(
            "SELECT user_id, court_id, sport, elo, updated_at FROM ratings \
             WHERE court_id = $1 AND sport = $2 ORDER BY elo DESC, user_id LIMIT $3",
        )
        .bind(court_id)
        .bind(sport.as_str())
        .bind(limit as i64)
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(rating_from_row)
        .collect()
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
