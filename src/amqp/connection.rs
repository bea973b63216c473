//! AMQP connection management with retry logic

use crate::config::AmqpSettings;
use crate::error::{MatchError, Result};
use amqprs::channel::Channel;
use amqprs::connection::{Connection, OpenConnectionArguments};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Wrapper around an AMQP connection
pub struct AmqpConnection {
    connection: Connection,
}

impl AmqpConnection {
    /// Create a new AMQP connection with retry logic
    pub async fn new(settings: &AmqpSettings) -> Result<Self> {
        let connection = Self::connect_with_retry(settings).await?;
        Ok(Self { connection })
    }

    /// Attempt to connect with exponential backoff retry
    async fn connect_with_retry(settings: &AmqpSettings) -> Result<Connection> {
        let mut retry_count = 0;
        let mut delay = Duration::from_millis(settings.retry_delay_ms);

        loop {
            match Self::try_connect(settings).await {
                Ok(connection) => {
                    info!(
                        host = %settings.host,
                        port = settings.port,
                        "Connected to AMQP broker"
                    );
                    return Ok(connection);
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > settings.max_retries {
                        error!(
                            "Failed to connect to AMQP after {} retries",
                            settings.max_retries
                        );
                        return Err(MatchError::dependency(format!(
                            "AMQP connection failed, max retries exceeded: {}",
                            e
                        )));
                    }

                    warn!(
                        "AMQP connection attempt {} failed: {}. Retrying in {:?}",
                        retry_count, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(30000));
                }
            }
        }
    }

    /// Single connection attempt
    async fn try_connect(settings: &AmqpSettings) -> Result<Connection> {
        let mut args = OpenConnectionArguments::new(
            &settings.host,
            settings.port,
            &settings.username,
            &settings.password,
        );
        args.virtual_host(&settings.vhost);

        Connection::open(&args)
            .await
            .map_err(|e| MatchError::dependency(format!("Failed to open AMQP connection: {}", e)))
    }

    /// Open a channel for publishing
    pub async fn open_channel(&self) -> Result<Channel> {
        self.connection
            .open_channel(None)
            .await
            .map_err(|e| MatchError::dependency(format!("Failed to open AMQP channel: {}", e)))
    }
}
