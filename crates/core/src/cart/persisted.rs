//! Saving and restoring the cart

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    cart::{Cart, CartHistory, CartItem},
    persistence::{
        CART_KEY, CART_RETENTION_DAYS, Persistence, PersistenceError, UNDO_HISTORY_KEY,
        UNDO_RETENTION_DAYS,
    },
};

/// The stored form of the cart's lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedCart {
    /// Line items.
    pub items: Vec<CartItem>,
}

impl Cart {
    /// Write the lines and the undo/redo log, each under its own key and
    /// retention.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if either write fails.
    pub fn save(&self, persistence: &Persistence) -> Result<(), PersistenceError> {
        let items = PersistedCart {
            items: self.items.clone(),
        };

        persistence.set(CART_KEY, &items, CART_RETENTION_DAYS)?;
        persistence.set(UNDO_HISTORY_KEY, &self.history, UNDO_RETENTION_DAYS)?;

        Ok(())
    }

    /// Restore a cart. Missing or expired entries come back empty, so a cart
    /// can outlive its history. The cart's history is stamped by the
    /// persistence clock from then on.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if the backend fails.
    pub fn load(persistence: &Persistence) -> Result<Self, PersistenceError> {
        let items = persistence
            .get::<PersistedCart>(CART_KEY)?
            .map(|cart| cart.items)
            .unwrap_or_default();

        let history = persistence
            .get::<CartHistory>(UNDO_HISTORY_KEY)?
            .unwrap_or_default();

        Ok(Self::from_parts(items, history, Arc::clone(persistence.clock())))
    }
}
