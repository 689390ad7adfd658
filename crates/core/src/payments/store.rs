//! Payment store
//!
//! The single in-flight payment for the session, the chosen method, the
//! provider artifacts needed to finish it, and the flags the checkout shows
//! while a request or the status poller is running.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    orders::OrderUuid,
    payments::models::{ClientSecret, Payment, PaymentMethod, PaymentStatus, StatusTransitionError},
    persistence::{PAYMENT_KEY, PAYMENT_RETENTION_DAYS, Persistence, PersistenceError},
};

/// Payment state for the checkout.
#[derive(Debug, Clone, Default)]
pub struct PaymentStore {
    payment: Option<Payment>,
    selected_method: Option<PaymentMethod>,
    is_processing: bool,
    is_polling: bool,
    error: Option<String>,
    qr_code_url: Option<String>,
    client_secret: Option<ClientSecret>,
}

/// The part of the payment store that survives a reload. Flags, errors and
/// the card client secret are deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedPayment {
    /// The active payment.
    pub payment: Option<Payment>,

    /// The chosen method.
    pub selected_method: Option<PaymentMethod>,

    /// QR payload for transfer payments.
    pub qr_code_url: Option<String>,
}

impl PaymentStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The active payment.
    pub fn payment(&self) -> Option<&Payment> {
        self.payment.as_ref()
    }

    /// The chosen method.
    pub fn selected_method(&self) -> Option<PaymentMethod> {
        self.selected_method
    }

    /// Whether a request is in flight.
    pub fn is_processing(&self) -> bool {
        self.is_processing
    }

    /// Whether the status poller is running.
    pub fn is_polling(&self) -> bool {
        self.is_polling
    }

    /// The message currently shown to the customer, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// QR payload for transfer payments.
    pub fn qr_code_url(&self) -> Option<&str> {
        self.qr_code_url.as_deref()
    }

    /// Client secret for card payments.
    pub fn client_secret(&self) -> Option<&ClientSecret> {
        self.client_secret.as_ref()
    }

    /// Choose a method; any message from the previous choice is cleared.
    pub fn select_payment_method(&mut self, method: PaymentMethod) {
        self.selected_method = Some(method);
        self.error = None;
    }

    /// Replace the active payment. The request that produced it is over, so
    /// the processing flag drops.
    pub fn set_payment(&mut self, payment: Payment) {
        debug!(payment_id = %payment.id, status = %payment.status, "payment stored");

        self.payment = Some(payment);
        self.is_processing = false;
    }

    /// Mark a request as in flight.
    pub fn set_processing(&mut self, processing: bool) {
        self.is_processing = processing;
    }

    /// Mark the status poller as running.
    pub fn set_polling(&mut self, polling: bool) {
        self.is_polling = polling;
    }

    /// Store the QR payload.
    pub fn set_qr_code_url(&mut self, url: Option<String>) {
        self.qr_code_url = url;
    }

    /// Store the card client secret.
    pub fn set_client_secret(&mut self, secret: Option<ClientSecret>) {
        self.client_secret = secret;
    }

    /// Show `message`. An error ends whatever was in flight, so both flags
    /// drop.
    pub fn set_error(&mut self, message: Option<String>) {
        self.error = message;
        self.is_processing = false;
        self.is_polling = false;
    }

    /// Show `message` without stopping anything; used while a transient
    /// failure is being retried.
    pub fn note_transient_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Move the active payment to `status`. Returns whether anything changed;
    /// with no active payment nothing does.
    ///
    /// # Errors
    ///
    /// Returns a [`StatusTransitionError`] when the update would move the
    /// payment backwards.
    pub fn set_status(&mut self, status: PaymentStatus, at: Timestamp) -> Result<bool, StatusTransitionError> {
        match self.payment.as_mut() {
            Some(payment) => payment.advance(status, at),
            None => Ok(false),
        }
    }

    /// Reset a processing payment to pending after the poller gives up.
    pub fn reset_status_after_timeout(&mut self, at: Timestamp) -> bool {
        self.payment
            .as_mut()
            .is_some_and(|payment| payment.reset_after_timeout(at))
    }

    /// Forget everything, to start a fresh payment.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether a payment exists that hasn't reached a terminal status.
    pub fn has_active_payment(&self) -> bool {
        self.payment
            .as_ref()
            .is_some_and(|payment| !payment.status.is_terminal())
    }

    /// Whether the chosen method is QR transfer.
    pub fn is_qr(&self) -> bool {
        self.selected_method == Some(PaymentMethod::QrTransfer)
    }

    /// Whether the chosen method is card.
    pub fn is_card(&self) -> bool {
        self.selected_method == Some(PaymentMethod::Card)
    }

    /// Whether the customer can press "pay": a method is chosen and nothing
    /// is in flight.
    pub fn can_proceed(&self) -> bool {
        self.selected_method.is_some() && !self.is_processing
    }

    /// The stored payment, if it belongs to `order_id` and can still be
    /// resumed.
    pub fn resume_candidate(&self, order_id: OrderUuid) -> Option<&Payment> {
        self.payment
            .as_ref()
            .filter(|payment| payment.order_id == order_id && payment.is_resumable())
    }

    /// The part of the store that survives a reload.
    pub fn snapshot(&self) -> PersistedPayment {
        PersistedPayment {
            payment: self.payment.clone(),
            selected_method: self.selected_method,
            qr_code_url: self.qr_code_url.clone(),
        }
    }

    /// Rebuild a store from a snapshot. Flags start cleared.
    pub fn restore(snapshot: PersistedPayment) -> Self {
        Self {
            payment: snapshot.payment,
            selected_method: snapshot.selected_method,
            qr_code_url: snapshot.qr_code_url,
            ..Self::default()
        }
    }

    /// Write the snapshot.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if the write fails.
    pub fn save(&self, persistence: &Persistence) -> Result<(), PersistenceError> {
        persistence.set(PAYMENT_KEY, &self.snapshot(), PAYMENT_RETENTION_DAYS)
    }

    /// Read the snapshot back; nothing stored gives an empty store.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if the backend fails.
    pub fn load(persistence: &Persistence) -> Result<Self, PersistenceError> {
        Ok(persistence
            .get::<PersistedPayment>(PAYMENT_KEY)?
            .map(Self::restore)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use testresult::TestResult;

    use crate::{
        clock::ManualClock,
        decimal::Amount,
        payments::models::PaymentUuid,
        persistence::MemoryStore,
    };

    use super::*;

    fn payment(order_id: OrderUuid, status: PaymentStatus) -> Payment {
        Payment {
            id: PaymentUuid::now_v7(),
            order_id,
            method: PaymentMethod::QrTransfer,
            status,
            amount: Amount::from_cents(676),
            paynow_qr_data: Some("00020101021226".to_string()),
            provider_payment_id: None,
            failure_reason: None,
            created_at: Timestamp::UNIX_EPOCH,
            updated_at: Timestamp::UNIX_EPOCH,
        }
    }

    fn persistence() -> Result<Persistence, jiff::Error> {
        let clock = Arc::new(ManualClock::new(Timestamp::from_second(1_767_225_600)?));

        Ok(Persistence::new(Arc::new(MemoryStore::new()), clock))
    }

    #[test]
    fn set_payment_ends_processing() {
        let mut store = PaymentStore::new();

        store.set_processing(true);
        store.set_payment(payment(OrderUuid::now_v7(), PaymentStatus::Pending));

        assert!(!store.is_processing());
        assert!(store.has_active_payment());
    }

    #[test]
    fn set_error_ends_processing_and_polling() {
        let mut store = PaymentStore::new();

        store.set_processing(true);
        store.set_polling(true);
        store.set_error(Some("Network error".to_string()));

        assert!(!store.is_processing());
        assert!(!store.is_polling());
        assert_eq!(store.error(), Some("Network error"));
    }

    #[test]
    fn transient_errors_keep_polling() {
        let mut store = PaymentStore::new();

        store.set_polling(true);
        store.note_transient_error("Network error. Retrying...");

        assert!(store.is_polling());
        assert_eq!(store.error(), Some("Network error. Retrying..."));
    }

    #[test]
    fn selecting_a_method_clears_the_error() {
        let mut store = PaymentStore::new();

        store.set_error(Some("declined".to_string()));
        store.select_payment_method(PaymentMethod::Card);

        assert!(store.is_card());
        assert!(!store.is_qr());
        assert!(store.can_proceed());
        assert_eq!(store.error(), None);
    }

    #[test]
    fn cannot_proceed_while_processing() {
        let mut store = PaymentStore::new();

        store.select_payment_method(PaymentMethod::QrTransfer);
        store.set_processing(true);

        assert!(!store.can_proceed());
    }

    #[test]
    fn status_updates_follow_the_transition_rules() -> TestResult {
        let mut store = PaymentStore::new();

        assert!(!store.set_status(PaymentStatus::Completed, Timestamp::UNIX_EPOCH)?);

        store.set_payment(payment(OrderUuid::now_v7(), PaymentStatus::Processing));

        assert!(store.set_status(PaymentStatus::Completed, Timestamp::UNIX_EPOCH)?);
        assert!(
            store
                .set_status(PaymentStatus::Processing, Timestamp::UNIX_EPOCH)
                .is_err()
        );
        assert!(!store.has_active_payment());

        Ok(())
    }

    #[test]
    fn resume_candidate_matches_order_and_status() {
        let order_id = OrderUuid::now_v7();
        let mut store = PaymentStore::new();

        store.set_payment(payment(order_id, PaymentStatus::Processing));

        assert!(store.resume_candidate(order_id).is_some());
        assert!(store.resume_candidate(OrderUuid::now_v7()).is_none());

        store.set_payment(payment(order_id, PaymentStatus::Completed));

        assert!(store.resume_candidate(order_id).is_none());
    }

    #[test]
    fn reload_keeps_payment_method_and_qr_only() -> TestResult {
        let persistence = persistence()?;
        let order_id = OrderUuid::now_v7();
        let mut store = PaymentStore::new();

        store.select_payment_method(PaymentMethod::QrTransfer);
        store.set_payment(payment(order_id, PaymentStatus::Pending));
        store.set_qr_code_url(Some("00020101021226".to_string()));
        store.set_client_secret(Some(ClientSecret::new("pi_secret")));
        store.set_processing(true);
        store.set_polling(true);
        store.note_transient_error("Network error. Retrying...");
        store.save(&persistence)?;

        let restored = PaymentStore::load(&persistence)?;

        assert_eq!(restored.snapshot(), store.snapshot());
        assert!(restored.client_secret().is_none());
        assert!(!restored.is_processing());
        assert!(!restored.is_polling());
        assert_eq!(restored.error(), None);
        assert!(restored.resume_candidate(order_id).is_some());

        Ok(())
    }

    #[test]
    fn reset_forgets_everything() {
        let mut store = PaymentStore::new();

        store.select_payment_method(PaymentMethod::Card);
        store.set_payment(payment(OrderUuid::now_v7(), PaymentStatus::Pending));
        store.reset();

        assert!(store.payment().is_none());
        assert!(store.selected_method().is_none());
    }
}
