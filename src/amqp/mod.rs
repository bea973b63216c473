//! AMQP integration for match result notifications
//!
//! This module handles the broker connection and publishes a notice to every
//! participant of a finished match. Delivery (email, push) happens downstream.

pub mod connection;
pub mod messages;
pub mod publisher;

// Re-export commonly used types
pub use connection::AmqpConnection;
pub use messages::*;
pub use publisher::{
    AmqpNotificationPublisher, LoggingNotificationPublisher, NotificationPublisher,
    PublisherConfig,
};
