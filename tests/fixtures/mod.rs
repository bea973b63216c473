//! Test fixtures and mock implementations for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use courtside::amqp::publisher::NotificationPublisher;
use courtside::error::{MatchError, Result};
use courtside::lifecycle::MatchManager;
use courtside::metrics::MetricsCollector;
use courtside::store::InMemoryMatchStore;
use courtside::types::{
    Court, CourtId, Match, MatchResultNotice, NewMatch, Sport, Team, UserId, UserProfile,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Mock publisher that captures notices and can be told to fail for some recipients
#[derive(Debug, Default)]
pub struct MockNotificationPublisher {
    published: Arc<Mutex<Vec<MatchResultNotice>>>,
    failing_contacts: Arc<Mutex<HashSet<String>>>,
}

impl MockNotificationPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish to `contact` fail
    pub fn fail_for(&self, contact: &str) {
        if let Ok(mut failing) = self.failing_contacts.lock() {
            failing.insert(contact.to_string());
        }
    }

    /// Get all published notices (for testing)
    pub fn get_published(&self) -> Vec<MatchResultNotice> {
        self.published
            .lock()
            .map(|notices| notices.clone())
            .unwrap_or_default()
    }

    pub fn notice_for(&self, contact: &str) -> Option<MatchResultNotice> {
        self.get_published()
            .into_iter()
            .find(|notice| notice.recipient_contact == contact)
    }
}

#[async_trait]
impl NotificationPublisher for MockNotificationPublisher {
    async fn publish_match_result(&self, notice: MatchResultNotice) -> Result<()> {
        let failing = self
            .failing_contacts
            .lock()
            .map(|failing| failing.contains(&notice.recipient_contact))
            .unwrap_or(false);
        if failing {
            return Err(MatchError::dependency(format!(
                "mail relay rejected {}",
                notice.recipient_contact
            )));
        }

        if let Ok(mut published) = self.published.lock() {
            published.push(notice);
        }
        Ok(())
    }
}

/// A complete engine over a seeded in-memory store
pub struct TestSystem {
    pub manager: MatchManager,
    pub store: InMemoryMatchStore,
    pub publisher: Arc<MockNotificationPublisher>,
    pub metrics: Arc<MetricsCollector>,
    pub court_id: CourtId,
}

impl TestSystem {
    pub async fn new() -> Self {
        let store = InMemoryMatchStore::new();
        let court_id = Uuid::new_v4();
        store
            .add_court(Court {
                id: court_id,
                name: "Riverside Park".to_string(),
            })
            .await;

        let publisher = Arc::new(MockNotificationPublisher::new());
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let manager = MatchManager::new(
            Arc::new(store.clone()),
            publisher.clone(),
            metrics.clone(),
        );

        Self {
            manager,
            store,
            publisher,
            metrics,
            court_id,
        }
    }

    /// Register a user with contact details `<name>@example.com`
    pub async fn player(&self, name: &str) -> UserId {
        let id = Uuid::new_v4();
        self.store
            .add_user(UserProfile {
                id,
                name: name.to_string(),
                contact: contact(name),
            })
            .await;
        id
    }

    pub async fn players(&self, names: &[&str]) -> Vec<UserId> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            ids.push(self.player(name).await);
        }
        ids
    }

    pub fn new_match(&self, sport: Sport, participant_count: u32) -> NewMatch {
        NewMatch {
            sport,
            court_id: self.court_id,
            participant_count,
            scheduled_at: None,
        }
    }

    /// Create a match with `team1[0]` as creator and seat everyone else
    pub async fn full_match(&self, sport: Sport, team1: &[UserId], team2: &[UserId]) -> Match {
        let participant_count = (team1.len() + team2.len()) as u32;
        let mut record = self
            .manager
            .create(team1[0], self.new_match(sport, participant_count))
            .await
            .unwrap();
        for &user in &team1[1..] {
            record = self.manager.join(record.id, user, Team::One).await.unwrap();
        }
        for &user in team2 {
            record = self.manager.join(record.id, user, Team::Two).await.unwrap();
        }
        record
    }

    /// Drive a full match through start and finish so it awaits scores
    pub async fn match_awaiting_score(
        &self,
        sport: Sport,
        team1: &[UserId],
        team2: &[UserId],
    ) -> Match {
        let record = self.full_match(sport, team1, team2).await;
        self.manager.start(record.id, team1[0]).await.unwrap();
        self.manager.finish(record.id, team1[0]).await.unwrap()
    }

    pub async fn elo(&self, user_id: UserId, sport: Sport) -> i32 {
        self.manager
            .rating(user_id, self.court_id, sport)
            .await
            .unwrap()
            .map(|entry| entry.elo)
            .unwrap()
    }
}

pub fn contact(name: &str) -> String {
    format!("{}@example.com", name.to_lowercase())
}
