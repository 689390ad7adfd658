//! App Context

use std::sync::Arc;

use brew::{
    cart::Cart,
    clock::{Clock, SystemClock},
    payments::store::PaymentStore,
    persistence::{FileStore, Persistence, PersistenceError, StorageError, initialize_persistence},
};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    api::{ApiClient, HttpOrdersApi, HttpPaymentsApi, OrdersApi, PaymentsApi},
    auth::{AuthApi, AuthSession, HttpAuthApi},
    checkout::{CheckoutDeps, PollerConfig},
    config::AppConfig,
    notify::{LogNotifier, Notifier},
    shared::Shared,
};

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("failed to open the data directory")]
    Storage(#[source] StorageError),

    #[error("failed to restore local state")]
    Persistence(#[from] PersistenceError),
}

#[derive(Clone)]
pub struct AppContext {
    pub persistence: Persistence,
    pub session: AuthSession,
    pub auth: Arc<dyn AuthApi>,
    pub payments: Arc<dyn PaymentsApi>,
    pub orders: Arc<dyn OrdersApi>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub cart: Shared<Cart>,
    pub payment_store: Shared<PaymentStore>,
    pub poller: PollerConfig,
    pub card_enabled: bool,
}

impl AppContext {
    /// Build application context from configuration: open the data
    /// directory, sweep expired entries, and restore the cart and payment.
    ///
    /// # Errors
    ///
    /// Returns an error when the data directory can't be opened or read.
    pub fn from_config(config: &AppConfig) -> Result<Self, AppInitError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = FileStore::open(config.storage.data_dir.clone()).map_err(AppInitError::Storage)?;
        let persistence = Persistence::new(Arc::new(store), Arc::clone(&clock));

        let swept = initialize_persistence(&persistence)?;

        if swept > 0 {
            info!(swept, "cleared expired local data");
        }

        let cart = Cart::load(&persistence)?;
        let payment_store = PaymentStore::load(&persistence)?;

        debug!(
            data_dir = %config.storage.data_dir.display(),
            items = cart.item_count(),
            payment = payment_store.payment().is_some(),
            "local state restored"
        );

        let session = AuthSession::new(persistence.clone());
        let client = ApiClient::new(config.api.base_url(), session.clone());

        Ok(Self {
            auth: Arc::new(HttpAuthApi::new(client.clone())),
            payments: Arc::new(HttpPaymentsApi::new(client.clone(), Arc::clone(&clock))),
            orders: Arc::new(HttpOrdersApi::new(client)),
            notifier: Arc::new(LogNotifier),
            clock,
            persistence,
            session,
            cart: Shared::new(cart),
            payment_store: Shared::new(payment_store),
            poller: PollerConfig::from(&config.polling),
            card_enabled: config.api.card_enabled(),
        })
    }

    /// What a checkout needs, sharing this context's cart and payment.
    pub fn checkout_deps(&self) -> CheckoutDeps {
        CheckoutDeps {
            payments: Arc::clone(&self.payments),
            orders: Arc::clone(&self.orders),
            notifier: Arc::clone(&self.notifier),
            clock: Arc::clone(&self.clock),
            persistence: self.persistence.clone(),
            cart: self.cart.clone(),
            payment_store: self.payment_store.clone(),
            poller: self.poller,
            card_enabled: self.card_enabled,
        }
    }

    /// Write the cart back to local storage.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if the write fails.
    pub fn save_cart(&self) -> Result<(), PersistenceError> {
        self.cart.lock().save(&self.persistence)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use brew::{cart::CartItem, decimal::Amount};
    use testresult::TestResult;

    use crate::config::{ApiConfig, LogFormat, LoggingConfig, PollingConfig, StorageConfig};

    use super::*;

    fn config(data_dir: PathBuf) -> AppConfig {
        AppConfig {
            api: ApiConfig {
                api_url: "http://localhost:8000/api".to_string(),
                card_publishable_key: None,
            },
            polling: PollingConfig {
                poll_interval_ms: 3_000,
                poll_max_retries: 30,
            },
            storage: StorageConfig { data_dir },
            logging: LoggingConfig {
                log_level: "info".to_string(),
                log_format: LogFormat::Compact,
            },
        }
    }

    #[test]
    fn restores_the_cart_between_runs() -> TestResult {
        let dir = tempfile::tempdir()?;
        let config = config(dir.path().to_path_buf());

        let first = AppContext::from_config(&config)?;

        first
            .cart
            .with(|cart| cart.add_item(CartItem::new("kopi", "Kopi", Amount::from_cents(120), "coffee")));
        first.save_cart()?;

        let second = AppContext::from_config(&config)?;

        assert_eq!(second.cart.lock().item_count(), 1);
        assert!(second.cart.lock().can_undo());
        assert!(!second.card_enabled);
        assert_eq!(second.poller, PollerConfig::default());

        Ok(())
    }
}
