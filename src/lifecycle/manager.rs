//! Match manager: the operations exposed to the transport layer
//!
//! Each operation opens one store transaction, reloads the match fresh, checks
//! its preconditions and commits. Any error drops the transaction, so a failed
//! operation leaves nothing behind. Result notifications are the one exception:
//! they go out after the finishing transaction has committed and their failures
//! are reported, not rolled back.

use crate::amqp::publisher::NotificationPublisher;
use crate::config::MatchSettings;
use crate::error::{MatchError, Result};
use crate::lifecycle::consensus::{self, NotificationFailure, ScoreOutcome};
use crate::lifecycle::machine::{self, load_match};
use crate::lifecycle::membership;
use crate::metrics::MetricsCollector;
use crate::rating::RatingEngine;
use crate::store::{MatchStore, StoreTransaction};
use crate::types::{
    CourtId, Match, MatchDetails, MatchFilter, MatchId, MatchPatch, MatchResultNotice, MatchState,
    MatchUpdate, NewMatch, RatingEntry, RatingKey, Score, Sport, Team, UserId,
};
use crate::utils::{current_timestamp, generate_match_id, validate_participant_count};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Orchestrates the match lifecycle against a store
#[derive(Clone)]
pub struct MatchManager {
    store: Arc<dyn MatchStore>,
    publisher: Arc<dyn NotificationPublisher>,
    rating_engine: RatingEngine,
    settings: MatchSettings,
    metrics: Arc<MetricsCollector>,
}

impl MatchManager {
    /// Create a manager with default rating and match settings
    pub fn new(
        store: Arc<dyn MatchStore>,
        publisher: Arc<dyn NotificationPublisher>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store,
            publisher,
            rating_engine: RatingEngine::default(),
            settings: MatchSettings::default(),
            metrics,
        }
    }

    pub fn with_rating_engine(mut self, rating_engine: RatingEngine) -> Self {
        self.rating_engine = rating_engine;
        self
    }

    pub fn with_settings(mut self, settings: MatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub fn rating_engine(&self) -> &RatingEngine {
        &self.rating_engine
    }

    /// Create a match in `AwaitingPlayers` with the creator seated on team 1
    pub async fn create(&self, creator_id: UserId, new_match: NewMatch) -> Result<Match> {
        self.observe("create", self.create_inner(creator_id, new_match))
            .await
    }

    /// Seat a user on a team; the join that fills the last seat makes the match `Ready`
    pub async fn join(&self, match_id: MatchId, user_id: UserId, team: Team) -> Result<Match> {
        self.observe("join", self.join_inner(match_id, user_id, team))
            .await
    }

    /// Creator starts a `Ready` match, stamping the start time
    pub async fn start(&self, match_id: MatchId, by_user: UserId) -> Result<Match> {
        self.observe("start", self.start_inner(match_id, by_user))
            .await
    }

    /// Creator ends play; the match then waits for both teams' score votes
    pub async fn finish(&self, match_id: MatchId, by_user: UserId) -> Result<Match> {
        self.observe("finish", self.finish_inner(match_id, by_user))
            .await
    }

    /// Record a member's score proposal and finalize on agreement
    pub async fn submit_score(
        &self,
        match_id: MatchId,
        user_id: UserId,
        score: Score,
    ) -> Result<ScoreOutcome> {
        self.observe("submit_score", self.submit_score_inner(match_id, user_id, score))
            .await
    }

    /// Remove a match with its memberships and votes. Allowed in any state.
    pub async fn delete(&self, match_id: MatchId) -> Result<()> {
        self.observe("delete", self.delete_inner(match_id)).await
    }

    /// A match together with both rosters
    pub async fn get(&self, match_id: MatchId) -> Result<MatchDetails> {
        self.observe("get", self.get_inner(match_id)).await
    }

    pub async fn list(&self, filter: MatchFilter) -> Result<Vec<Match>> {
        self.observe("list", async {
            let mut tx = self.store.begin().await?;
            let matches = tx.list_matches(&filter).await?;
            Ok(matches)
        })
        .await
    }

    /// Creator reschedules a match that has not started yet
    pub async fn update(
        &self,
        match_id: MatchId,
        by_user: UserId,
        update: MatchUpdate,
    ) -> Result<Match> {
        self.observe("update", self.update_inner(match_id, by_user, update))
            .await
    }

    pub async fn rating(
        &self,
        user_id: UserId,
        court_id: CourtId,
        sport: Sport,
    ) -> Result<Option<RatingEntry>> {
        self.observe("rating", async {
            let mut tx = self.store.begin().await?;
            let entry = tx
                .get_rating(&RatingKey::new(user_id, court_id, sport))
                .await?;
            Ok(entry)
        })
        .await
    }

    /// Highest rated players for a court and sport
    pub async fn leaderboard(
        &self,
        court_id: CourtId,
        sport: Sport,
        limit: usize,
    ) -> Result<Vec<RatingEntry>> {
        self.observe("leaderboard", async {
            if limit == 0 {
                return Err(MatchError::validation("leaderboard limit must be positive"));
            }
            let mut tx = self.store.begin().await?;
            let entries = tx.list_ratings(court_id, sport, limit).await?;
            Ok(entries)
        })
        .await
    }

    async fn create_inner(&self, creator_id: UserId, new_match: NewMatch) -> Result<Match> {
        validate_participant_count(
            new_match.participant_count,
            self.settings.max_participant_count,
        )?;

        let mut tx = self.store.begin().await?;
        if tx.get_court(new_match.court_id).await?.is_none() {
            return Err(MatchError::NotFound {
                entity: "Court",
                id: new_match.court_id.to_string(),
            });
        }

        let now = current_timestamp();
        let record = Match {
            id: generate_match_id(),
            sport: new_match.sport,
            scheduled_at: new_match.scheduled_at,
            participant_count: new_match.participant_count,
            state: MatchState::AwaitingPlayers,
            score1: None,
            score2: None,
            court_id: new_match.court_id,
            creator_id,
            created_at: now,
            updated_at: now,
        };
        tx.upsert_match(&record).await?;
        membership::seat_member(tx.as_mut(), &record, creator_id, Team::One).await?;
        self.ensure_rating(tx.as_mut(), &record, creator_id).await?;
        tx.commit().await?;

        self.metrics.record_match_created(record.sport);
        info!(
            match_id = %record.id,
            creator_id = %creator_id,
            sport = %record.sport,
            court_id = %record.court_id,
            participants = record.participant_count,
            "Created match"
        );
        Ok(record)
    }

    async fn join_inner(&self, match_id: MatchId, user_id: UserId, team: Team) -> Result<Match> {
        let mut tx = self.store.begin().await?;
        let record = load_match(tx.as_mut(), match_id).await?;
        machine::ensure_state(&record, MatchState::AwaitingPlayers, "join")?;

        membership::seat_member(tx.as_mut(), &record, user_id, team).await?;
        self.ensure_rating(tx.as_mut(), &record, user_id).await?;

        let record = if membership::is_full(tx.as_mut(), &record).await? {
            machine::advance(tx.as_mut(), &record, MatchPatch::default(), "join").await?
        } else {
            record
        };
        tx.commit().await?;

        self.metrics.record_member_joined(team);
        info!(
            match_id = %match_id,
            user_id = %user_id,
            team = %team,
            state = %record.state,
            "Player joined match"
        );
        if record.state == MatchState::Ready {
            self.record_transition(&record, MatchState::AwaitingPlayers);
        }
        Ok(record)
    }

    async fn start_inner(&self, match_id: MatchId, by_user: UserId) -> Result<Match> {
        let mut tx = self.store.begin().await?;
        let record = load_match(tx.as_mut(), match_id).await?;
        machine::ensure_state(&record, MatchState::Ready, "start")?;
        machine::ensure_creator_member(tx.as_mut(), &record, by_user, "start").await?;

        let patch = MatchPatch::default().with_scheduled_at(current_timestamp());
        let started = machine::advance(tx.as_mut(), &record, patch, "start").await?;
        tx.commit().await?;

        self.record_transition(&started, record.state);
        Ok(started)
    }

    async fn finish_inner(&self, match_id: MatchId, by_user: UserId) -> Result<Match> {
        let mut tx = self.store.begin().await?;
        let record = load_match(tx.as_mut(), match_id).await?;
        machine::ensure_state(&record, MatchState::InProgress, "finish")?;
        machine::ensure_creator_member(tx.as_mut(), &record, by_user, "finish").await?;

        let finished = machine::advance(tx.as_mut(), &record, MatchPatch::default(), "finish")
            .await?;
        tx.commit().await?;

        self.record_transition(&finished, record.state);
        Ok(finished)
    }

    async fn submit_score_inner(
        &self,
        match_id: MatchId,
        user_id: UserId,
        score: Score,
    ) -> Result<ScoreOutcome> {
        score.validate()?;

        let mut tx = self.store.begin().await?;
        let record = load_match(tx.as_mut(), match_id).await?;
        machine::ensure_state(&record, MatchState::AwaitingScore, "submit a score")?;

        let recorded = consensus::record_vote(tx.as_mut(), &record, user_id, score).await?;

        if !recorded.consensus {
            let tentative = tx
                .patch_match(match_id, &MatchPatch::default().with_score(score))
                .await?
                .ok_or_else(|| MatchError::match_not_found(match_id))?;
            tx.commit().await?;
            self.metrics.record_vote(false);

            debug!(
                match_id = %match_id,
                user_id = %user_id,
                team = %recorded.vote.team,
                score = %score,
                "Score awaiting confirmation from the other team"
            );
            return Ok(ScoreOutcome::Pending {
                record: tentative,
                tentative: score,
            });
        }

        let patch = MatchPatch::default().with_score(score);
        let finished = machine::advance(tx.as_mut(), &record, patch, "submit a score").await?;
        let rating_changes = self
            .rating_engine
            .apply_result(tx.as_mut(), &finished, score)
            .await?;

        let (notices, mut notification_failures) = if self.settings.notify_on_finish {
            self.build_notices(tx.as_mut(), &finished, score).await?
        } else {
            (Vec::new(), Vec::new())
        };
        tx.commit().await?;

        self.metrics.record_vote(true);
        self.record_transition(&finished, record.state);
        self.metrics
            .record_finalized(finished.sport, rating_changes.len());
        info!(
            match_id = %match_id,
            score = %score,
            participants = rating_changes.len(),
            "Match finalized"
        );

        notification_failures.extend(self.dispatch_notices(notices).await);
        for failure in &notification_failures {
            self.metrics.record_notification_failure();
            warn!(
                match_id = %match_id,
                user_id = %failure.user_id,
                reason = %failure.reason,
                "Result notification failed"
            );
        }

        Ok(ScoreOutcome::Finalized {
            record: finished,
            score,
            rating_changes,
            notification_failures,
        })
    }

    async fn delete_inner(&self, match_id: MatchId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_match(match_id).await? {
            return Err(MatchError::match_not_found(match_id));
        }
        tx.commit().await?;

        info!(match_id = %match_id, "Deleted match");
        Ok(())
    }

    async fn get_inner(&self, match_id: MatchId) -> Result<MatchDetails> {
        let mut tx = self.store.begin().await?;
        let match_info = load_match(tx.as_mut(), match_id).await?;
        let team1 = tx.list_members_by_team(match_id, Team::One).await?;
        let team2 = tx.list_members_by_team(match_id, Team::Two).await?;
        Ok(MatchDetails {
            match_info,
            team1,
            team2,
        })
    }

    async fn update_inner(
        &self,
        match_id: MatchId,
        by_user: UserId,
        update: MatchUpdate,
    ) -> Result<Match> {
        let scheduled_at = update
            .scheduled_at
            .ok_or_else(|| MatchError::validation("update changes nothing"))?;

        let mut tx = self.store.begin().await?;
        let record = load_match(tx.as_mut(), match_id).await?;
        machine::ensure_state_in(
            &record,
            &[MatchState::AwaitingPlayers, MatchState::Ready],
            "update",
        )?;
        machine::ensure_creator_member(tx.as_mut(), &record, by_user, "update").await?;

        let updated = tx
            .patch_match(match_id, &MatchPatch::default().with_scheduled_at(scheduled_at))
            .await?
            .ok_or_else(|| MatchError::match_not_found(match_id))?;
        tx.commit().await?;

        info!(match_id = %match_id, scheduled_at = %scheduled_at, "Rescheduled match");
        Ok(updated)
    }

    async fn ensure_rating(
        &self,
        tx: &mut dyn StoreTransaction,
        record: &Match,
        user_id: UserId,
    ) -> Result<()> {
        let key = RatingKey::new(user_id, record.court_id, record.sport);
        self.rating_engine.ensure_entry(tx, key).await?;
        Ok(())
    }

    /// Build one notice per member. Members without a profile cannot be
    /// reached and are reported as failures instead.
    async fn build_notices(
        &self,
        tx: &mut dyn StoreTransaction,
        record: &Match,
        score: Score,
    ) -> Result<(Vec<(UserId, MatchResultNotice)>, Vec<NotificationFailure>)> {
        let court_name = match tx.get_court(record.court_id).await? {
            Some(court) => court.name,
            None => record.court_id.to_string(),
        };

        let mut notices = Vec::new();
        let mut failures = Vec::new();
        for team in Team::ALL {
            let (their_score, opponent_score) = score.for_team(team);
            for membership in tx.list_members_by_team(record.id, team).await? {
                let Some(profile) = tx.get_user(membership.user_id).await? else {
                    failures.push(NotificationFailure {
                        user_id: membership.user_id,
                        reason: "no contact details on file".to_string(),
                    });
                    continue;
                };
                notices.push((
                    membership.user_id,
                    MatchResultNotice {
                        match_id: record.id,
                        recipient_contact: profile.contact,
                        recipient_name: profile.name,
                        sport: record.sport,
                        court_name: court_name.clone(),
                        their_score,
                        opponent_score,
                    },
                ));
            }
        }
        Ok((notices, failures))
    }

    /// Send every notice at once so one slow recipient does not hold up the rest
    async fn dispatch_notices(
        &self,
        notices: Vec<(UserId, MatchResultNotice)>,
    ) -> Vec<NotificationFailure> {
        let sends = notices.into_iter().map(|(user_id, notice)| async move {
            self.publisher
                .publish_match_result(notice)
                .await
                .err()
                .map(|e| NotificationFailure {
                    user_id,
                    reason: e.to_string(),
                })
        });
        join_all(sends).await.into_iter().flatten().collect()
    }

    fn record_transition(&self, record: &Match, from: MatchState) {
        self.metrics.record_transition(from, record.state);
        info!(
            match_id = %record.id,
            from = %from,
            to = %record.state,
            "Match state changed"
        );
    }

    /// Time an operation and count its failures by kind
    async fn observe<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = fut.await;
        let error_kind = result.as_ref().err().map(MatchError::kind);
        self.metrics
            .record_operation(operation, started.elapsed(), error_kind);

        if let Err(e) = &result {
            if e.is_user_recoverable() {
                debug!(operation, error = %e, "Operation rejected");
            } else {
                warn!(operation, error = %e, "Operation failed");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amqp::publisher::LoggingNotificationPublisher;
    use crate::store::scripted::ScriptedStore;
    use crate::store::InMemoryMatchStore;
    use crate::types::{Court, UserProfile};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    async fn manager() -> (MatchManager, CourtId) {
        let store = InMemoryMatchStore::new();
        let court_id = Uuid::new_v4();
        store
            .add_court(Court {
                id: court_id,
                name: "Riverside".to_string(),
            })
            .await;
        let manager = MatchManager::new(
            Arc::new(store),
            Arc::new(LoggingNotificationPublisher),
            Arc::new(MetricsCollector::new().unwrap()),
        );
        (manager, court_id)
    }

    fn new_match(court_id: CourtId, participant_count: u32) -> NewMatch {
        NewMatch {
            sport: Sport::PingPong,
            court_id,
            participant_count,
            scheduled_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_seats_creator_and_rates_them() {
        let (manager, court_id) = manager().await;
        let creator = Uuid::new_v4();

        let record = manager
            .create(creator, new_match(court_id, 2))
            .await
            .unwrap();
        assert_eq!(record.state, MatchState::AwaitingPlayers);

        let details = manager.get(record.id).await.unwrap();
        assert_eq!(details.team1.len(), 1);
        assert_eq!(details.team1[0].user_id, creator);
        assert!(details.team2.is_empty());

        let rating = manager
            .rating(creator, court_id, Sport::PingPong)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rating.elo, 1000);
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let (manager, court_id) = manager().await;

        let err = manager
            .create(Uuid::new_v4(), new_match(court_id, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::Validation { .. }));

        let err = manager
            .create(Uuid::new_v4(), new_match(Uuid::new_v4(), 2))
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::NotFound { entity: "Court", .. }));
    }

    #[tokio::test]
    async fn test_update_only_before_start() {
        let (manager, court_id) = manager().await;
        let creator = Uuid::new_v4();
        let record = manager
            .create(creator, new_match(court_id, 2))
            .await
            .unwrap();
        let when = current_timestamp() + chrono::Duration::days(1);

        let err = manager
            .update(
                record.id,
                Uuid::new_v4(),
                MatchUpdate {
                    scheduled_at: Some(when),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::Forbidden { .. }));

        let updated = manager
            .update(
                record.id,
                creator,
                MatchUpdate {
                    scheduled_at: Some(when),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.scheduled_at, Some(when));

        manager
            .join(record.id, Uuid::new_v4(), Team::Two)
            .await
            .unwrap();
        manager.start(record.id, creator).await.unwrap();
        let err = manager
            .update(
                record.id,
                creator,
                MatchUpdate {
                    scheduled_at: Some(when),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_failures_are_counted_by_kind() {
        let (manager, _) = manager().await;
        let missing = Uuid::new_v4();

        let err = manager.start(missing, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, MatchError::NotFound { .. }));
        assert_eq!(
            manager
                .metrics()
                .operation_errors_total
                .with_label_values(&["start", "not_found"])
                .get(),
            1
        );
    }

    #[derive(Debug, Default)]
    struct SlowPublisher {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl NotificationPublisher for SlowPublisher {
        async fn publish_match_result(&self, _notice: MatchResultNotice) -> Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Seat `players` (creator first, alternating teams) and play the match
    /// up to the score vote
    async fn awaiting_score(manager: &MatchManager, court_id: CourtId, players: &[UserId]) -> Match {
        let record = manager
            .create(players[0], new_match(court_id, players.len() as u32))
            .await
            .unwrap();
        for (n, user) in players.iter().enumerate().skip(1) {
            let team = if n % 2 == 0 { Team::One } else { Team::Two };
            manager.join(record.id, *user, team).await.unwrap();
        }
        manager.start(record.id, players[0]).await.unwrap();
        manager.finish(record.id, players[0]).await.unwrap()
    }

    #[tokio::test]
    async fn test_votes_are_counted_only_once_committed() {
        let store = ScriptedStore::default();
        let court_id = Uuid::new_v4();
        store
            .inner
            .add_court(Court {
                id: court_id,
                name: "Riverside".to_string(),
            })
            .await;
        let manager = MatchManager::new(
            Arc::new(store.clone()),
            Arc::new(LoggingNotificationPublisher),
            Arc::new(MetricsCollector::new().unwrap()),
        );
        let players = [Uuid::new_v4(), Uuid::new_v4()];
        let record = awaiting_score(&manager, court_id, &players).await;
        let votes = |result: &str| {
            manager
                .metrics()
                .score_votes_total
                .with_label_values(&[result])
                .get()
        };

        store.script.fail_commit.store(true, Ordering::SeqCst);
        let err = manager
            .submit_score(record.id, players[0], Score::new(11, 7))
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::DependencyFailure { .. }));
        assert_eq!(votes("pending"), 0);

        store.script.fail_commit.store(false, Ordering::SeqCst);
        manager
            .submit_score(record.id, players[0], Score::new(11, 7))
            .await
            .unwrap();
        assert_eq!(votes("pending"), 1);

        store.script.fail_commit.store(true, Ordering::SeqCst);
        manager
            .submit_score(record.id, players[1], Score::new(11, 7))
            .await
            .unwrap_err();
        assert_eq!(votes("consensus"), 0);
        assert_eq!(
            manager
                .metrics()
                .matches_finalized_total
                .with_label_values(&[Sport::PingPong.as_str()])
                .get(),
            0
        );
    }

    #[tokio::test]
    async fn test_notices_are_sent_concurrently() {
        let store = InMemoryMatchStore::new();
        let court_id = Uuid::new_v4();
        store
            .add_court(Court {
                id: court_id,
                name: "Riverside".to_string(),
            })
            .await;
        let players: Vec<UserId> = (0..4).map(|_| Uuid::new_v4()).collect();
        for (n, id) in players.iter().enumerate() {
            store
                .add_user(UserProfile {
                    id: *id,
                    name: format!("Player {}", n),
                    contact: format!("player{}@example.com", n),
                })
                .await;
        }
        let publisher = Arc::new(SlowPublisher::default());
        let manager = MatchManager::new(
            Arc::new(store),
            publisher.clone(),
            Arc::new(MetricsCollector::new().unwrap()),
        );
        let record = awaiting_score(&manager, court_id, &players).await;

        manager
            .submit_score(record.id, players[0], Score::new(2, 0))
            .await
            .unwrap();
        let outcome = manager
            .submit_score(record.id, players[1], Score::new(2, 0))
            .await
            .unwrap();

        match outcome {
            ScoreOutcome::Finalized {
                notification_failures,
                ..
            } => assert!(notification_failures.is_empty()),
            other => panic!("expected a finalized match, got {:?}", other),
        }
        assert_eq!(publisher.peak.load(Ordering::SeqCst), 4);
    }
}
