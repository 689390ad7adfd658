//! Polling Config

use std::time::Duration;

use clap::Args;

/// Payment status polling settings.
#[derive(Debug, Clone, Args)]
pub struct PollingConfig {
    /// Milliseconds between payment status checks
    #[arg(long, env = "PAYMENT_POLL_INTERVAL_MS", default_value_t = 3_000)]
    pub poll_interval_ms: u64,

    /// Non-terminal checks before giving up
    #[arg(long, env = "PAYMENT_POLL_MAX_RETRIES", default_value_t = 30)]
    pub poll_max_retries: u32,
}

impl PollingConfig {
    /// Interval between checks.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
