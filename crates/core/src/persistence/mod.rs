//! Persistence
//!
//! Values are wrapped with the time they were written and an absolute expiry
//! before being serialised. Expiry is fixed at write time; reading an entry
//! never extends it.

use std::sync::Arc;

use jiff::SignedDuration;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::Clock;

mod store;

pub use store::{FileStore, KeyValueStore, MemoryStore, StorageError};

/// Key holding the cart's line items.
pub const CART_KEY: &str = "morning-brew-cart";

/// Key holding the cart's undo/redo log.
pub const UNDO_HISTORY_KEY: &str = "morning-brew-undo-history";

/// Key holding the resumable subset of the payment store.
pub const PAYMENT_KEY: &str = "morning-brew-payment";

/// Key holding the bearer token issued at login.
pub const AUTH_TOKEN_KEY: &str = "morning-brew-auth-token";

/// Days cart items are retained.
pub const CART_RETENTION_DAYS: u32 = 30;

/// Days the undo/redo log is retained.
pub const UNDO_RETENTION_DAYS: u32 = 7;

/// Days a payment snapshot is retained, in line with cart data.
pub const PAYMENT_RETENTION_DAYS: u32 = 30;

/// Errors raised while persisting values.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The backend failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The value could not be serialised.
    #[error("failed to serialise value for {key}")]
    Serialize {
        /// Key being written.
        key: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredData<T> {
    data: T,
    /// Unix milliseconds at write time.
    timestamp: i64,
    /// Unix milliseconds after which the entry is dead; `None` never expires.
    expires_at: Option<i64>,
}

/// Only the expiry, for sweeping entries without knowing their payload type.
#[derive(Debug, Deserialize)]
struct StoredExpiry {
    expires_at: Option<i64>,
}

/// Expiring JSON persistence over a [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct Persistence {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl Persistence {
    /// Create a persistence layer over `store`, reading time from `clock`.
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The clock used to stamp and expire entries.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Write `data` under `key`, expiring `retention_days` from now.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if serialisation or the backend fails.
    pub fn set<T: Serialize>(
        &self,
        key: &str,
        data: &T,
        retention_days: u32,
    ) -> Result<(), PersistenceError> {
        let retention = SignedDuration::from_hours(i64::from(retention_days) * 24);

        self.write(key, data, Some(retention))
    }

    /// Write `data` under `key` with no expiry.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if serialisation or the backend fails.
    pub fn set_indefinitely<T: Serialize>(&self, key: &str, data: &T) -> Result<(), PersistenceError> {
        self.write(key, data, None)
    }

    fn write<T: Serialize>(
        &self,
        key: &str,
        data: &T,
        retention: Option<SignedDuration>,
    ) -> Result<(), PersistenceError> {
        let timestamp = self.clock.now().as_millisecond();
        let expires_at = retention.map(|retention| {
            let millis = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);

            timestamp.saturating_add(millis)
        });

        let encoded = serde_json::to_string(&StoredData {
            data,
            timestamp,
            expires_at,
        })
        .map_err(|source| PersistenceError::Serialize {
            key: key.to_string(),
            source,
        })?;

        self.store.write(key, &encoded)?;

        debug!(key, ?expires_at, "persisted value");

        Ok(())
    }

    /// Read the value under `key`.
    ///
    /// Expired entries are evicted and read as absent. Entries that no longer
    /// decode as `T` are logged and read as absent but left in place.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if the backend fails.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PersistenceError> {
        let Some(raw) = self.store.read(key)? else {
            return Ok(None);
        };

        let stored: StoredData<T> = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(error) => {
                warn!(key, %error, "ignoring undecodable persisted value");

                return Ok(None);
            }
        };

        if self.is_expired(stored.expires_at) {
            self.store.delete(key)?;

            debug!(key, "evicted expired value");

            return Ok(None);
        }

        Ok(Some(stored.data))
    }

    /// Remove `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if the backend fails.
    pub fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        self.store.delete(key)?;

        Ok(())
    }

    /// Sweep every key once, evicting entries past their expiry. Returns the
    /// number of evicted keys.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if the backend fails.
    pub fn clear_expired(&self) -> Result<usize, PersistenceError> {
        let mut evicted = 0;

        for key in self.store.keys()? {
            let Some(raw) = self.store.read(&key)? else {
                continue;
            };

            match serde_json::from_str::<StoredExpiry>(&raw) {
                Ok(stored) if self.is_expired(stored.expires_at) => {
                    self.store.delete(&key)?;
                    evicted += 1;
                }
                Ok(_) => {}
                Err(error) => warn!(key, %error, "skipping undecodable persisted value"),
            }
        }

        if evicted > 0 {
            debug!(evicted, "cleared expired values");
        }

        Ok(evicted)
    }

    /// Remove every key.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if the backend fails.
    pub fn clear_all(&self) -> Result<(), PersistenceError> {
        self.store.clear()?;

        Ok(())
    }

    fn is_expired(&self, expires_at: Option<i64>) -> bool {
        expires_at.is_some_and(|expires_at| expires_at < self.clock.now().as_millisecond())
    }
}

/// Start-of-session housekeeping: drop everything past its retention.
///
/// # Errors
///
/// Returns a [`PersistenceError`] if the backend fails.
pub fn initialize_persistence(persistence: &Persistence) -> Result<usize, PersistenceError> {
    persistence.clear_expired()
}
