//! Metrics and monitoring for the courtside engine
//!
//! This module provides Prometheus metrics for lifecycle transitions, score
//! consensus, rating updates and operation latency.

pub mod collector;

pub use collector::MetricsCollector;
