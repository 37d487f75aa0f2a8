pub mod app_config;
pub mod config;
pub mod feeds;
pub mod providers;

pub use app_config::AppConfig;
pub use config::{load_app_config, load_app_config_from_env};
pub use feeds::{Feed, Post, ProviderProfile};
pub use providers::{Provider, ProviderSelection};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid provider \"{0}\". Allowed: instagram,tiktok")]
    InvalidProvider(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("config validation failed: {0}")]
    Validation(String),
}
