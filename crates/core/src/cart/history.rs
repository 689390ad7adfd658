//! Undo/redo log

use std::collections::VecDeque;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::cart::CartItem;

/// Most entries kept on either side of the log.
pub const HISTORY_LIMIT: usize = 10;

/// What a logged mutation did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CartActionKind {
    /// A line was added or its quantity incremented.
    Add {
        /// The item as passed in.
        item: CartItem,
    },

    /// A line was removed.
    Remove {
        /// Identifier of the removed line.
        id: String,
    },

    /// A line's quantity was set.
    Update {
        /// Identifier of the updated line.
        id: String,
        /// Requested quantity.
        quantity: u32,
    },

    /// Every line was removed.
    Clear,
}

/// A logged cart mutation, with the line items as they were before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartAction {
    /// The mutation.
    pub kind: CartActionKind,

    /// When the mutation happened.
    pub timestamp: Timestamp,

    /// Items before the mutation.
    pub previous: Vec<CartItem>,
}

/// Bounded past and future logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartHistory {
    past: VecDeque<CartAction>,
    future: VecDeque<CartAction>,
}

impl CartHistory {
    /// Log a new mutation, forgetting anything that could have been redone.
    pub fn record(&mut self, action: CartAction) {
        push_bounded(&mut self.past, action);
        self.future.clear();
    }

    /// Take the newest past entry. The caller hands back the items it is
    /// replacing, which become the redo snapshot stamped `now`.
    pub fn undo(&mut self, current: Vec<CartItem>, now: Timestamp) -> Option<Vec<CartItem>> {
        let action = self.past.pop_back()?;

        push_bounded(
            &mut self.future,
            CartAction {
                kind: action.kind,
                timestamp: now,
                previous: current,
            },
        );

        Some(action.previous)
    }

    /// Mirror of [`CartHistory::undo`].
    pub fn redo(&mut self, current: Vec<CartItem>, now: Timestamp) -> Option<Vec<CartItem>> {
        let action = self.future.pop_back()?;

        push_bounded(
            &mut self.past,
            CartAction {
                kind: action.kind,
                timestamp: now,
                previous: current,
            },
        );

        Some(action.previous)
    }

    /// Number of undoable entries.
    pub fn past_len(&self) -> usize {
        self.past.len()
    }

    /// Number of redoable entries.
    pub fn future_len(&self) -> usize {
        self.future.len()
    }

    /// Newest undoable entry.
    pub fn last(&self) -> Option<&CartAction> {
        self.past.back()
    }

    /// Whether both logs are empty.
    pub fn is_empty(&self) -> bool {
        self.past.is_empty() && self.future.is_empty()
    }

    /// Bound a log that came from outside (e.g. storage) to the limit.
    pub(crate) fn normalize(mut self) -> Self {
        while self.past.len() > HISTORY_LIMIT {
            self.past.pop_front();
        }

        while self.future.len() > HISTORY_LIMIT {
            self.future.pop_front();
        }

        self
    }
}

fn push_bounded(log: &mut VecDeque<CartAction>, action: CartAction) {
    log.push_back(action);

    while log.len() > HISTORY_LIMIT {
        log.pop_front();
    }
}
