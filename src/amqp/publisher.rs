//! Publishers for match result notifications

use crate::amqp::connection::AmqpConnection;
use crate::amqp::messages::{MessageEnvelope, MATCH_FINISHED_ROUTING_KEY};
use crate::config::AmqpSettings;
use crate::error::{MatchError, Result};
use crate::types::MatchResultNotice;
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Hook invoked once per participant when a match finishes
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish_match_result(&self, notice: MatchResultNotice) -> Result<()>;
}

/// Configuration for notification publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub exchange: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            exchange: "courtside.notifications".to_string(),
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

impl From<&AmqpSettings> for PublisherConfig {
    fn from(settings: &AmqpSettings) -> Self {
        Self {
            exchange: settings.exchange.clone(),
            max_retries: settings.max_retries,
            retry_delay_ms: settings.retry_delay_ms,
        }
    }
}

/// AMQP-based notification publisher
pub struct AmqpNotificationPublisher {
    channel: Channel,
    config: PublisherConfig,
    // Closing the connection would close the channel
    _connection: AmqpConnection,
}

impl AmqpNotificationPublisher {
    /// Create a publisher and declare its exchange
    pub async fn new(connection: AmqpConnection, config: PublisherConfig) -> Result<Self> {
        let channel = connection.open_channel().await?;

        let args = ExchangeDeclareArguments::new(&config.exchange, "topic");
        channel.exchange_declare(args).await.map_err(|e| {
            MatchError::dependency(format!(
                "Failed to declare exchange {}: {}",
                config.exchange, e
            ))
        })?;
        info!(exchange = %config.exchange, "Declared notification exchange");

        Ok(Self {
            channel,
            config,
            _connection: connection,
        })
    }

    /// Publish with bounded exponential backoff
    async fn publish_with_retry(&self, envelope: &MessageEnvelope<MatchResultNotice>) -> Result<()> {
        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(envelope).await {
                Ok(()) => {
                    debug!(
                        "Published message {} to exchange {}",
                        envelope.correlation_id, self.config.exchange
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish message {} after {} retries: {}",
                            envelope.correlation_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for message {}: {}. Retrying in {:?}",
                        retry_count, envelope.correlation_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    /// Single publish attempt
    async fn try_publish(&self, envelope: &MessageEnvelope<MatchResultNotice>) -> Result<()> {
        let payload = envelope.to_bytes()?;

        let args = BasicPublishArguments::new(&self.config.exchange, &envelope.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&envelope.correlation_id)
            .with_timestamp(envelope.timestamp.timestamp() as u64)
            .with_content_type("application/json");

        self.channel
            .basic_publish(properties, payload, args)
            .await
            .map_err(|e| MatchError::dependency(format!("Failed to publish message: {}", e)))
    }
}

#[async_trait]
impl NotificationPublisher for AmqpNotificationPublisher {
    async fn publish_match_result(&self, notice: MatchResultNotice) -> Result<()> {
        let envelope = MessageEnvelope::new(notice, MATCH_FINISHED_ROUTING_KEY);
        self.publish_with_retry(&envelope).await
    }
}

/// Publisher that only writes notices to the log
#[derive(Debug, Clone, Default)]
pub struct LoggingNotificationPublisher;

#[async_trait]
impl NotificationPublisher for LoggingNotificationPublisher {
    async fn publish_match_result(&self, notice: MatchResultNotice) -> Result<()> {
        info!(
            match_id = %notice.match_id,
            recipient = %notice.recipient_contact,
            sport = %notice.sport,
            court = %notice.court_name,
            "{}: your {} match finished {}-{}",
            notice.recipient_name,
            notice.sport,
            notice.their_score,
            notice.opponent_score
        );
        Ok(())
    }
}
