//! Common types used throughout the match lifecycle engine

use crate::error::MatchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for users
pub type UserId = Uuid;

/// Unique identifier for matches
pub type MatchId = Uuid;

/// Unique identifier for courts
pub type CourtId = Uuid;

/// Sport played in a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sport {
    Basketball,
    Football,
    PingPong,
}

impl Sport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Basketball => "Basketball",
            Sport::Football => "Football",
            Sport::PingPong => "PingPong",
        }
    }
}

impl std::fmt::Display for Sport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sport {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basketball" => Ok(Sport::Basketball),
            "football" => Ok(Sport::Football),
            "pingpong" | "ping_pong" | "ping-pong" => Ok(Sport::PingPong),
            _ => Err(MatchError::validation(format!("unknown sport '{}'", s))),
        }
    }
}

/// Lifecycle state of a match. States advance strictly in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchState {
    AwaitingPlayers,
    Ready,
    InProgress,
    AwaitingScore,
    Finished,
}

impl MatchState {
    /// The only state this one may move to, `None` once finished
    pub fn next(&self) -> Option<MatchState> {
        match self {
            MatchState::AwaitingPlayers => Some(MatchState::Ready),
            MatchState::Ready => Some(MatchState::InProgress),
            MatchState::InProgress => Some(MatchState::AwaitingScore),
            MatchState::AwaitingScore => Some(MatchState::Finished),
            MatchState::Finished => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchState::AwaitingPlayers => "AwaitingPlayers",
            MatchState::Ready => "Ready",
            MatchState::InProgress => "InProgress",
            MatchState::AwaitingScore => "AwaitingScore",
            MatchState::Finished => "Finished",
        }
    }
}

impl std::fmt::Display for MatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchState {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AwaitingPlayers" => Ok(MatchState::AwaitingPlayers),
            "Ready" => Ok(MatchState::Ready),
            "InProgress" => Ok(MatchState::InProgress),
            "AwaitingScore" => Ok(MatchState::AwaitingScore),
            "Finished" => Ok(MatchState::Finished),
            _ => Err(MatchError::validation(format!("unknown match state '{}'", s))),
        }
    }
}

/// One of the two sides of a match, serialized as `1` or `2`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Team {
    One,
    Two,
}

impl Team {
    pub const ALL: [Team; 2] = [Team::One, Team::Two];

    pub fn opponent(&self) -> Team {
        match self {
            Team::One => Team::Two,
            Team::Two => Team::One,
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            Team::One => 1,
            Team::Two => 2,
        }
    }
}

impl TryFrom<u8> for Team {
    type Error = MatchError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Team::One),
            2 => Ok(Team::Two),
            other => Err(MatchError::validation(format!(
                "team must be 1 or 2, got {}",
                other
            ))),
        }
    }
}

impl From<Team> for u8 {
    fn from(team: Team) -> Self {
        team.number()
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// A final or proposed score, always expressed as (team 1, team 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Score {
    pub score1: i32,
    pub score2: i32,
}

impl Score {
    pub fn new(score1: i32, score2: i32) -> Self {
        Self { score1, score2 }
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.score1 < 0 || self.score2 < 0 {
            return Err(MatchError::validation(format!(
                "scores cannot be negative, got {}-{}",
                self.score1, self.score2
            )));
        }
        Ok(())
    }

    /// (own score, opponent score) from the given team's point of view
    pub fn for_team(&self, team: Team) -> (i32, i32) {
        match team {
            Team::One => (self.score1, self.score2),
            Team::Two => (self.score2, self.score1),
        }
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.score1, self.score2)
    }
}

/// A match record as persisted by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub sport: Sport,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub participant_count: u32,
    pub state: MatchState,
    pub score1: Option<i32>,
    pub score2: Option<i32>,
    pub court_id: CourtId,
    pub creator_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    /// Maximum members per team
    pub fn capacity(&self) -> u32 {
        self.participant_count / 2
    }

    pub fn score(&self) -> Option<Score> {
        match (self.score1, self.score2) {
            (Some(score1), Some(score2)) => Some(Score { score1, score2 }),
            _ => None,
        }
    }

    pub fn apply(&mut self, patch: &MatchPatch, now: DateTime<Utc>) {
        if let Some(state) = patch.state {
            self.state = state;
        }
        if let Some(scheduled_at) = patch.scheduled_at {
            self.scheduled_at = Some(scheduled_at);
        }
        if let Some(score) = patch.score {
            self.score1 = Some(score.score1);
            self.score2 = Some(score.score2);
        }
        self.updated_at = now;
    }
}

/// Parameters for creating a match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMatch {
    pub sport: Sport,
    pub court_id: CourtId,
    pub participant_count: u32,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Partial update of a match. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchPatch {
    pub state: Option<MatchState>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub score: Option<Score>,
}

impl MatchPatch {
    pub fn state(state: MatchState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    pub fn with_scheduled_at(mut self, scheduled_at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(scheduled_at);
        self
    }

    pub fn with_score(mut self, score: Score) -> Self {
        self.score = Some(score);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.scheduled_at.is_none() && self.score.is_none()
    }
}

/// Fields a creator may change before the match starts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchUpdate {
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// A user's seat in a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMembership {
    pub user_id: UserId,
    pub match_id: MatchId,
    pub team: Team,
    pub joined_at: DateTime<Utc>,
}

/// A team representative's score proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreVote {
    pub match_id: MatchId,
    pub user_id: UserId,
    pub team: Team,
    pub score: Score,
    pub submitted_at: DateTime<Utc>,
}

/// Identity of a rating record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RatingKey {
    pub user_id: UserId,
    pub court_id: CourtId,
    pub sport: Sport,
}

impl RatingKey {
    pub fn new(user_id: UserId, court_id: CourtId, sport: Sport) -> Self {
        Self {
            user_id,
            court_id,
            sport,
        }
    }
}

/// Per (user, court, sport) skill rating
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingEntry {
    pub user_id: UserId,
    pub court_id: CourtId,
    pub sport: Sport,
    pub elo: i32,
    pub updated_at: DateTime<Utc>,
}

impl RatingEntry {
    pub fn new(key: RatingKey, elo: i32) -> Self {
        Self {
            user_id: key.user_id,
            court_id: key.court_id,
            sport: key.sport,
            elo,
            updated_at: Utc::now(),
        }
    }

    pub fn key(&self) -> RatingKey {
        RatingKey::new(self.user_id, self.court_id, self.sport)
    }
}

/// Rating change applied to one participant at consensus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingChange {
    pub user_id: UserId,
    pub team: Team,
    pub old_elo: i32,
    pub new_elo: i32,
    pub delta: i32,
}

/// A court that matches are played on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Court {
    pub id: CourtId,
    pub name: String,
}

/// Contact details for a user, used only for result notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub contact: String,
}

/// Notification sent to each participant once a match is finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResultNotice {
    pub match_id: MatchId,
    pub recipient_contact: String,
    pub recipient_name: String,
    pub sport: Sport,
    pub court_name: String,
    pub their_score: i32,
    pub opponent_score: i32,
}

/// A match together with both rosters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchDetails {
    #[serde(rename = "match")]
    pub match_info: Match,
    pub team1: Vec<TeamMembership>,
    pub team2: Vec<TeamMembership>,
}

/// Filter for listing matches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchFilter {
    pub court_id: Option<CourtId>,
    pub sport: Option<Sport>,
    pub state: Option<MatchState>,
}

impl MatchFilter {
    pub fn matches(&self, m: &Match) -> bool {
        self.court_id.map_or(true, |court_id| m.court_id == court_id)
            && self.sport.map_or(true, |sport| m.sport == sport)
            && self.state.map_or(true, |state| m.state == state)
    }
}
