//! Main application state and service wiring
//!
//! `AppState` turns an `AppConfig` into a ready `MatchManager`: it picks the
//! store backend, connects the notification publisher and shares one metrics
//! registry between them.

use crate::amqp::connection::AmqpConnection;
use crate::amqp::publisher::{
    AmqpNotificationPublisher, LoggingNotificationPublisher, NotificationPublisher,
    PublisherConfig,
};
use crate::config::{AppConfig, StoreBackend};
use crate::lifecycle::MatchManager;
use crate::metrics::MetricsCollector;
use crate::rating::{EloCalculator, RatingEngine};
use crate::store::{InMemoryMatchStore, MatchStore};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },
}

/// Application state containing all service components
pub struct AppState {
    config: AppConfig,
    manager: MatchManager,
    metrics: Arc<MetricsCollector>,
}

impl AppState {
    /// Build every component from configuration
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        let store = Self::initialize_store(&config).await?;
        Self::with_store(config, store).await
    }

    /// Build the service around an already constructed store
    pub async fn with_store(
        config: AppConfig,
        store: Arc<dyn MatchStore>,
    ) -> Result<Self, ServiceError> {
        info!(
            service = %config.service.name,
            backend = ?config.store.backend,
            amqp = config.amqp.enabled,
            "Initializing courtside"
        );

        let metrics = Arc::new(MetricsCollector::new().map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            }
        })?);
        let publisher = Self::initialize_publisher(&config).await?;

        let calculator =
            EloCalculator::new(&config.rating).map_err(|e| ServiceError::Configuration {
                message: e.to_string(),
            })?;
        let manager = MatchManager::new(store, publisher, metrics.clone())
            .with_rating_engine(RatingEngine::new(calculator))
            .with_settings(config.matches.clone());

        Ok(Self {
            config,
            manager,
            metrics,
        })
    }

    async fn initialize_store(config: &AppConfig) -> Result<Arc<dyn MatchStore>, ServiceError> {
        match config.store.backend {
            StoreBackend::Memory => {
                info!("Using in-memory store");
                Ok(Arc::new(InMemoryMatchStore::new()))
            }
            StoreBackend::Postgres => Self::initialize_postgres(config).await,
        }
    }

    #[cfg(feature = "postgres")]
    async fn initialize_postgres(config: &AppConfig) -> Result<Arc<dyn MatchStore>, ServiceError> {
        use crate::store::PgMatchStore;

        let url = config
            .store
            .database_url
            .as_deref()
            .ok_or_else(|| ServiceError::Configuration {
                message: "store.database_url is required for the postgres backend".to_string(),
            })?;
        let store = PgMatchStore::connect(url, config.store.max_connections)
            .await
            .map_err(|e| ServiceError::Store {
                message: e.to_string(),
            })?;
        store.migrate().await.map_err(|e| ServiceError::Store {
            message: e.to_string(),
        })?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "postgres"))]
    async fn initialize_postgres(_config: &AppConfig) -> Result<Arc<dyn MatchStore>, ServiceError> {
        Err(ServiceError::Configuration {
            message: "postgres backend requires building with the `postgres` feature".to_string(),
        })
    }

    async fn initialize_publisher(
        config: &AppConfig,
    ) -> Result<Arc<dyn NotificationPublisher>, ServiceError> {
        if !config.amqp.enabled {
            info!("AMQP disabled, result notifications go to the log");
            return Ok(Arc::new(LoggingNotificationPublisher));
        }

        let connection =
            AmqpConnection::new(&config.amqp)
                .await
                .map_err(|e| ServiceError::AmqpConnection {
                    message: e.to_string(),
                })?;
        let publisher =
            AmqpNotificationPublisher::new(connection, PublisherConfig::from(&config.amqp))
                .await
                .map_err(|e| ServiceError::AmqpConnection {
                    message: e.to_string(),
                })?;
        Ok(Arc::new(publisher))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn manager(&self) -> &MatchManager {
        &self.manager
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }
}
