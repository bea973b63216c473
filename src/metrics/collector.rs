//! Metrics collection using Prometheus

use crate::error::ErrorKind;
use crate::types::{MatchState, Sport, Team};
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Main metrics collector for the match engine
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    pub matches_created_total: IntCounterVec,
    pub members_joined_total: IntCounterVec,
    pub state_transitions_total: IntCounterVec,
    /// Votes by result: pending, consensus
    pub score_votes_total: IntCounterVec,
    pub matches_finalized_total: IntCounterVec,
    pub rating_updates_total: IntCounter,
    pub notification_failures_total: IntCounter,
    pub operation_errors_total: IntCounterVec,
    pub operation_duration_seconds: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let matches_created_total = IntCounterVec::new(
            Opts::new("courtside_matches_created_total", "Matches created"),
            &["sport"],
        )?;
        let members_joined_total = IntCounterVec::new(
            Opts::new("courtside_members_joined_total", "Players joined via Join"),
            &["team"],
        )?;
        let state_transitions_total = IntCounterVec::new(
            Opts::new("courtside_state_transitions_total", "Match state transitions"),
            &["from", "to"],
        )?;
        let score_votes_total = IntCounterVec::new(
            Opts::new("courtside_score_votes_total", "Score votes recorded"),
            &["result"],
        )?;
        let matches_finalized_total = IntCounterVec::new(
            Opts::new(
                "courtside_matches_finalized_total",
                "Matches that reached score consensus",
            ),
            &["sport"],
        )?;
        let rating_updates_total = IntCounter::new(
            "courtside_rating_updates_total",
            "Individual rating entries rewritten at consensus",
        )?;
        let notification_failures_total = IntCounter::new(
            "courtside_notification_failures_total",
            "Result notifications that could not be published",
        )?;
        let operation_errors_total = IntCounterVec::new(
            Opts::new("courtside_operation_errors_total", "Failed lifecycle operations"),
            &["operation", "kind"],
        )?;
        let operation_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "courtside_operation_duration_seconds",
                "Lifecycle operation latency",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["operation"],
        )?;

        registry.register(Box::new(matches_created_total.clone()))?;
        registry.register(Box::new(members_joined_total.clone()))?;
        registry.register(Box::new(state_transitions_total.clone()))?;
        registry.register(Box::new(score_votes_total.clone()))?;
        registry.register(Box::new(matches_finalized_total.clone()))?;
        registry.register(Box::new(rating_updates_total.clone()))?;
        registry.register(Box::new(notification_failures_total.clone()))?;
        registry.register(Box::new(operation_errors_total.clone()))?;
        registry.register(Box::new(operation_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            matches_created_total,
            members_joined_total,
            state_transitions_total,
            score_votes_total,
            matches_finalized_total,
            rating_updates_total,
            notification_failures_total,
            operation_errors_total,
            operation_duration_seconds,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn record_match_created(&self, sport: Sport) {
        self.matches_created_total
            .with_label_values(&[sport.as_str()])
            .inc();
    }

    pub fn record_member_joined(&self, team: Team) {
        let team = team.to_string();
        self.members_joined_total
            .with_label_values(&[team.as_str()])
            .inc();
    }

    pub fn record_transition(&self, from: MatchState, to: MatchState) {
        self.state_transitions_total
            .with_label_values(&[from.as_str(), to.as_str()])
            .inc();
    }

    pub fn record_vote(&self, consensus: bool) {
        let result = if consensus { "consensus" } else { "pending" };
        self.score_votes_total.with_label_values(&[result]).inc();
    }

    pub fn record_finalized(&self, sport: Sport, rating_updates: usize) {
        self.matches_finalized_total
            .with_label_values(&[sport.as_str()])
            .inc();
        self.rating_updates_total.inc_by(rating_updates as u64);
    }

    pub fn record_notification_failure(&self) {
        self.notification_failures_total.inc();
    }

    pub fn record_operation(&self, operation: &str, duration: Duration, error: Option<ErrorKind>) {
        self.operation_duration_seconds
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());

        if let Some(kind) = error {
            self.operation_errors_total
                .with_label_values(&[operation, kind.as_str()])
                .inc();
        }
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
