//! Configuration
//!
//! Settings come from the command line, the environment, and a `.env` file,
//! in that order of precedence.

use clap::Args;

pub use self::{
    api::ApiConfig,
    logging::{LogFormat, LoggingConfig},
    polling::PollingConfig,
    storage::StorageConfig,
};

mod api;
mod logging;
mod polling;
mod storage;

/// Storefront client configuration.
#[derive(Debug, Clone, Args)]
pub struct AppConfig {
    /// Backend API settings.
    #[command(flatten)]
    pub api: ApiConfig,

    /// Payment status polling settings.
    #[command(flatten)]
    pub polling: PollingConfig,

    /// Local storage settings.
    #[command(flatten)]
    pub storage: StorageConfig,

    /// Logging output settings.
    #[command(flatten)]
    pub logging: LoggingConfig,
}
