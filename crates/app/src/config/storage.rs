//! Storage Config

use std::path::PathBuf;

use clap::Args;

/// Local storage settings.
#[derive(Debug, Clone, Args)]
pub struct StorageConfig {
    /// Directory holding the cart, payment and session files
    #[arg(long, env = "BREW_DATA_DIR", default_value = ".brew")]
    pub data_dir: PathBuf,
}
