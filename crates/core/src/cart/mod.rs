//! Cart
//!
//! An ordered list of line items with a bounded undo/redo log. Totals are
//! derived from the current lines on every call, never cached.

use std::{num::NonZeroU32, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    clock::{Clock, SystemClock},
    decimal::Amount,
};

mod history;
mod persisted;

pub use history::{CartAction, CartActionKind, CartHistory, HISTORY_LIMIT};
pub use persisted::PersistedCart;

/// A line in the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    /// Product identifier; unique per line.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Unit price.
    pub price: Amount,

    /// Units on this line; a line never holds zero.
    pub quantity: NonZeroU32,

    /// Menu category.
    pub category: String,
}

impl CartItem {
    /// A single unit of a product.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        price: Amount,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            quantity: NonZeroU32::MIN,
            category: category.into(),
        }
    }

    /// The same product with a different quantity.
    #[must_use]
    pub fn with_quantity(self, quantity: NonZeroU32) -> Self {
        Self { quantity, ..self }
    }

    /// Unit price multiplied by quantity.
    pub fn line_total(&self) -> Amount {
        self.price.times(self.quantity.get())
    }
}

/// The shopping cart. Two carts are equal when their lines and history are;
/// the clock that stamps the history is not compared.
#[derive(Debug, Clone)]
pub struct Cart {
    items: Vec<CartItem>,
    history: CartHistory,
    clock: Arc<dyn Clock>,
}

impl Default for Cart {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl PartialEq for Cart {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items && self.history == other.history
    }
}

impl Cart {
    /// An empty cart with no history, stamped by the wall clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty cart whose history is stamped by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            items: Vec::new(),
            history: CartHistory::default(),
            clock,
        }
    }

    /// A cart restored from its parts.
    pub fn from_parts(items: Vec<CartItem>, history: CartHistory, clock: Arc<dyn Clock>) -> Self {
        Self {
            items,
            history: history.normalize(),
            clock,
        }
    }

    /// Current lines, in the order they were first added.
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// The undo/redo log.
    pub fn history(&self) -> &CartHistory {
        &self.history
    }

    /// Look up a line by product id.
    pub fn find(&self, id: &str) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Whether the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add `item`. A line with the same id absorbs the quantity; otherwise a
    /// new line is appended.
    pub fn add_item(&mut self, item: CartItem) {
        self.record(CartActionKind::Add { item: item.clone() });

        match self.items.iter_mut().find(|line| line.id == item.id) {
            Some(line) => line.quantity = line.quantity.saturating_add(item.quantity.get()),
            None => self.items.push(item),
        }
    }

    /// Remove the line for `id`. Unknown ids leave the cart untouched.
    pub fn remove_item(&mut self, id: &str) {
        if self.find(id).is_none() {
            return;
        }

        self.record(CartActionKind::Remove { id: id.to_string() });
        self.items.retain(|item| item.id != id);
    }

    /// Set the quantity of the line for `id`; zero removes the line. Unknown
    /// ids leave the cart untouched.
    pub fn update_quantity(&mut self, id: &str, quantity: u32) {
        if self.find(id).is_none() {
            return;
        }

        self.record(CartActionKind::Update {
            id: id.to_string(),
            quantity,
        });

        match NonZeroU32::new(quantity) {
            Some(quantity) => self
                .items
                .iter_mut()
                .filter(|item| item.id == id)
                .for_each(|item| item.quantity = quantity),
            None => self.items.retain(|item| item.id != id),
        }
    }

    /// Remove every line.
    pub fn clear_cart(&mut self) {
        if self.items.is_empty() {
            return;
        }

        self.record(CartActionKind::Clear);
        self.items.clear();
    }

    /// Empty the cart after a successful payment. Nothing is logged and the
    /// history is dropped so the purchase can't be undone back into the cart.
    pub fn checkout_complete(&mut self) {
        self.items.clear();
        self.history = CartHistory::default();
    }

    /// Restore the lines from before the newest logged mutation. Returns
    /// whether anything changed.
    pub fn undo(&mut self) -> bool {
        let current = self.items.clone();

        match self.history.undo(current, self.clock.now()) {
            Some(previous) => {
                self.items = previous;
                true
            }
            None => false,
        }
    }

    /// Reapply the newest undone mutation. Returns whether anything changed.
    pub fn redo(&mut self) -> bool {
        let current = self.items.clone();

        match self.history.redo(current, self.clock.now()) {
            Some(next) => {
                self.items = next;
                true
            }
            None => false,
        }
    }

    /// Whether [`Cart::undo`] would change anything.
    pub fn can_undo(&self) -> bool {
        self.history.past_len() > 0
    }

    /// Whether [`Cart::redo`] would change anything.
    pub fn can_redo(&self) -> bool {
        self.history.future_len() > 0
    }

    /// Total units across all lines.
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0_u32, |count, item| count.saturating_add(item.quantity.get()))
    }

    /// Sum of line totals.
    pub fn subtotal(&self) -> Amount {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// GST on the subtotal, to four decimal places.
    pub fn gst(&self) -> Amount {
        self.subtotal().gst()
    }

    /// Subtotal plus GST, to four decimal places.
    pub fn total(&self) -> Amount {
        let subtotal = self.subtotal();

        subtotal + subtotal.gst()
    }

    /// Subtotal plus GST, rounded to cents.
    pub fn total_for_display(&self) -> Amount {
        self.subtotal().with_gst_for_display()
    }

    fn record(&mut self, kind: CartActionKind) {
        debug!(?kind, "cart mutation");

        self.history.record(CartAction {
            kind,
            timestamp: self.clock.now(),
            previous: self.items.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use jiff::{SignedDuration, Timestamp};
    use testresult::TestResult;

    use crate::{clock::ManualClock, decimal::AmountError};

    use super::*;

    fn item(id: &str, price: &str) -> Result<CartItem, AmountError> {
        Ok(CartItem::new(id, id.to_uppercase(), price.parse()?, "drinks"))
    }

    fn qty(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
    }

    fn ids(cart: &Cart) -> Vec<(&str, u32)> {
        cart.items()
            .iter()
            .map(|item| (item.id.as_str(), item.quantity.get()))
            .collect()
    }

    #[test]
    fn adding_the_same_product_merges_lines() -> TestResult {
        let mut cart = Cart::new();

        cart.add_item(item("kopi", "1.20")?);
        cart.add_item(item("kopi", "1.20")?);
        cart.add_item(item("toast", "2.50")?);

        assert_eq!(ids(&cart), vec![("kopi", 2), ("toast", 1)]);
        assert_eq!(cart.item_count(), 3);

        Ok(())
    }

    #[test]
    fn kopi_and_toast_totals() -> TestResult {
        let mut cart = Cart::new();

        cart.add_item(item("kopi", "1.20")?);
        cart.add_item(item("toast", "2.50")?.with_quantity(qty(2)));

        assert_eq!(cart.subtotal(), "6.20".parse::<Amount>()?);
        assert_eq!(cart.gst(), "0.558".parse::<Amount>()?);
        assert_eq!(cart.total(), "6.758".parse::<Amount>()?);
        assert_eq!(cart.total_for_display(), "6.76".parse::<Amount>()?);

        Ok(())
    }

    #[test]
    fn update_quantity_to_zero_removes_the_line() -> TestResult {
        let mut cart = Cart::new();

        cart.add_item(item("kopi", "1.20")?);
        cart.update_quantity("kopi", 0);

        assert!(cart.is_empty());

        Ok(())
    }

    #[test]
    fn update_quantity_sets_the_line() -> TestResult {
        let mut cart = Cart::new();

        cart.add_item(item("kopi", "1.20")?);
        cart.update_quantity("kopi", 4);

        assert_eq!(ids(&cart), vec![("kopi", 4)]);
        assert_eq!(cart.subtotal(), "4.80".parse::<Amount>()?);

        Ok(())
    }

    #[test]
    fn unknown_ids_are_ignored() -> TestResult {
        let mut cart = Cart::new();

        cart.add_item(item("kopi", "1.20")?);
        let before = cart.clone();

        cart.update_quantity("teh", 3);
        cart.remove_item("teh");

        assert_eq!(cart, before);

        Ok(())
    }

    #[test]
    fn undo_restores_the_state_before_each_mutation() -> TestResult {
        let mut cart = Cart::new();

        cart.add_item(item("kopi", "1.20")?);
        cart.add_item(item("toast", "2.50")?);
        cart.update_quantity("kopi", 3);
        cart.remove_item("toast");

        assert!(cart.undo());
        assert_eq!(ids(&cart), vec![("kopi", 3), ("toast", 1)]);

        assert!(cart.undo());
        assert_eq!(ids(&cart), vec![("kopi", 1), ("toast", 1)]);

        assert!(cart.undo());
        assert!(cart.undo());
        assert!(cart.is_empty());

        assert!(!cart.undo());
        assert!(cart.is_empty());

        Ok(())
    }

    #[test]
    fn history_is_stamped_by_the_cart_clock() -> TestResult {
        let start = Timestamp::from_second(1_767_225_600)?;
        let clock = Arc::new(ManualClock::new(start));
        let mut cart = Cart::with_clock(Arc::clone(&clock) as Arc<dyn Clock>);

        cart.add_item(item("kopi", "1.20")?);

        assert_eq!(cart.history().last().map(|action| action.timestamp), Some(start));

        clock.advance(SignedDuration::from_mins(1));
        cart.undo();
        clock.advance(SignedDuration::from_mins(1));
        cart.redo();

        assert_eq!(
            cart.history().last().map(|action| action.timestamp),
            Some(start + SignedDuration::from_mins(2))
        );

        Ok(())
    }

    #[test]
    fn redo_replays_undone_mutations() -> TestResult {
        let mut cart = Cart::new();

        cart.add_item(item("kopi", "1.20")?);
        cart.update_quantity("kopi", 5);

        cart.undo();
        cart.undo();

        assert!(cart.redo());
        assert_eq!(ids(&cart), vec![("kopi", 1)]);

        assert!(cart.redo());
        assert_eq!(ids(&cart), vec![("kopi", 5)]);

        assert!(!cart.redo());

        Ok(())
    }

    #[test]
    fn new_mutations_invalidate_redo() -> TestResult {
        let mut cart = Cart::new();

        cart.add_item(item("kopi", "1.20")?);
        cart.undo();
        cart.add_item(item("toast", "2.50")?);

        assert!(!cart.can_redo());
        assert!(!cart.redo());
        assert_eq!(ids(&cart), vec![("toast", 1)]);

        Ok(())
    }

    #[test]
    fn undo_on_empty_history_is_a_no_op() {
        let mut cart = Cart::new();

        assert!(!cart.undo());
        assert!(!cart.redo());
        assert_eq!(cart, Cart::new());
    }

    #[test]
    fn both_logs_are_capped() -> TestResult {
        let mut cart = Cart::new();

        for n in 0..25 {
            cart.add_item(item(&format!("item-{n}"), "1.00")?);
        }

        assert_eq!(cart.history().past_len(), HISTORY_LIMIT);

        while cart.undo() {}

        assert_eq!(cart.items().len(), 15);
        assert_eq!(cart.history().future_len(), HISTORY_LIMIT);

        Ok(())
    }

    #[test]
    fn clear_cart_is_undoable() -> TestResult {
        let mut cart = Cart::new();

        cart.add_item(item("kopi", "1.20")?);
        cart.clear_cart();

        assert!(cart.is_empty());
        assert!(cart.undo());
        assert_eq!(ids(&cart), vec![("kopi", 1)]);

        Ok(())
    }

    #[test]
    fn checkout_complete_drops_history() -> TestResult {
        let mut cart = Cart::new();

        cart.add_item(item("kopi", "1.20")?);
        cart.checkout_complete();

        assert!(cart.is_empty());
        assert!(!cart.can_undo());

        Ok(())
    }

    #[test]
    fn subtotal_has_no_drift_over_many_additions() {
        let mut cart = Cart::new();
        let mut expected_cents: i64 = 0;

        for n in 0..1_000_i64 {
            let cents = (n * 37) % 1_000 + 1;

            cart.add_item(CartItem::new(
                format!("p{n}"),
                "Product",
                Amount::from_cents(cents),
                "test",
            ));
            expected_cents += cents;
        }

        assert_eq!(cart.subtotal(), Amount::from_cents(expected_cents));
        assert_eq!(cart.item_count(), 1_000);
    }
}
