//! API Config

use clap::Args;

/// Backend API settings.
#[derive(Debug, Clone, Args)]
pub struct ApiConfig {
    /// Backend API root, without the version segment
    #[arg(long, env = "BREW_API_URL", default_value = "http://localhost:8000/api")]
    pub api_url: String,

    /// Card processor publishable key; the card method is unavailable without it
    #[arg(long, env = "CARD_PUBLISHABLE_KEY", hide_env_values = true)]
    pub card_publishable_key: Option<String>,
}

impl ApiConfig {
    /// Versioned API root, e.g. `http://localhost:8000/api/v1`.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}/v1", self.api_url.trim_end_matches('/'))
    }

    /// Whether the card form can be shown.
    #[must_use]
    pub fn card_enabled(&self) -> bool {
        self.card_publishable_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_url: &str, key: Option<&str>) -> ApiConfig {
        ApiConfig {
            api_url: api_url.to_string(),
            card_publishable_key: key.map(str::to_string),
        }
    }

    #[test]
    fn base_url_appends_the_version() {
        assert_eq!(
            config("http://localhost:8000/api", None).base_url(),
            "http://localhost:8000/api/v1"
        );
        assert_eq!(
            config("https://brew.example/api//", None).base_url(),
            "https://brew.example/api/v1"
        );
    }

    #[test]
    fn blank_publishable_keys_disable_cards() {
        assert!(!config("http://x", None).card_enabled());
        assert!(!config("http://x", Some("  ")).card_enabled());
        assert!(config("http://x", Some("pk_test_123")).card_enabled());
    }
}
