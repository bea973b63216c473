//! Configuration management for the courtside service
//!
//! This module handles configuration loading from TOML files and environment
//! variables, validation, and default values.

pub mod app;
pub mod rating;

// Re-export commonly used types
pub use app::{
    validate_config, AmqpSettings, AppConfig, MatchSettings, ServiceSettings, StoreBackend,
    StoreSettings,
};
pub use rating::RatingConfig;
