//! Payment flow
//!
//! The checkout as a state machine. Every state carries exactly the data it
//! needs: processing knows its method and artifacts, errors carry their
//! classification, and the retry budget belongs to the flow rather than to
//! any process-wide counter. Transitions are pure; the I/O that triggers
//! them lives with the caller.

use std::fmt;

use jiff::{SignedDuration, Timestamp};
use smallvec::SmallVec;
use thiserror::Error;
use tracing::debug;

use crate::{
    orders::OrderUuid,
    payments::{
        errors::{PaymentError, ProviderFailure, RetryBudget, RetryDecision, classify},
        models::{ClientSecret, Payment, PaymentMethod, PaymentStatus, PaymentUuid},
    },
};

/// How long a QR code stays payable when the rail doesn't say.
pub const QR_VALIDITY: SignedDuration = SignedDuration::from_mins(15);

/// Pages outside the checkout. Going to one ends the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// The cart.
    Cart,
    /// The menu.
    Catalog,
    /// The customer's orders.
    Orders,
    /// Tracking for one order.
    OrderTracking(OrderUuid),
    /// Customer support.
    Support,
    /// The receipt for a completed payment.
    Confirmation {
        /// Paid order.
        order: OrderUuid,
        /// Completed payment.
        payment: PaymentUuid,
    },
}

impl Destination {
    /// Site path.
    pub fn path(&self) -> String {
        match self {
            Self::Cart => "/cart".to_string(),
            Self::Catalog => "/menu".to_string(),
            Self::Orders => "/orders".to_string(),
            Self::OrderTracking(order) => format!("/orders/{order}"),
            Self::Support => "/support".to_string(),
            Self::Confirmation { order, payment } => {
                format!("/checkout/confirmation?orderId={order}&paymentId={payment}")
            }
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Result of the availability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    /// QR transfer is up.
    pub qr_transfer: bool,
    /// Card is up.
    pub card: bool,
}

impl Availability {
    /// Everything up.
    pub const ALL: Self = Self {
        qr_transfer: true,
        card: true,
    };

    /// Whether `method` is up.
    pub const fn is_available(self, method: PaymentMethod) -> bool {
        match method {
            PaymentMethod::QrTransfer => self.qr_transfer,
            PaymentMethod::Card => self.card,
        }
    }

    /// Whether anything is up.
    pub const fn any(self) -> bool {
        self.qr_transfer || self.card
    }

    /// Methods that are up, in the order they are offered.
    pub fn methods(self) -> SmallVec<[PaymentMethod; 2]> {
        PaymentMethod::ALL
            .into_iter()
            .filter(|method| self.is_available(*method))
            .collect()
    }
}

/// A QR code on screen and the time it stops being payable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrSession {
    /// Payment the code settles.
    pub payment_id: PaymentUuid,
    /// QR payload.
    pub payload: String,
    /// Expiry.
    pub expires_at: Timestamp,
}

impl QrSession {
    /// A session issued at `issued_at`. Without an expiry from the rail the
    /// code lasts [`QR_VALIDITY`].
    pub fn new(
        payment_id: PaymentUuid,
        payload: impl Into<String>,
        issued_at: Timestamp,
        expires_at: Option<Timestamp>,
    ) -> Self {
        let expires_at = expires_at.unwrap_or_else(|| {
            issued_at
                .checked_add(QR_VALIDITY)
                .unwrap_or(Timestamp::MAX)
        });

        Self {
            payment_id,
            payload: payload.into(),
            expires_at,
        }
    }

    /// Time left, never negative.
    pub fn remaining(&self, now: Timestamp) -> SignedDuration {
        self.expires_at.duration_since(now).max(SignedDuration::ZERO)
    }

    /// Whether the code can no longer be paid.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Time left as `m:ss`.
    pub fn countdown(&self, now: Timestamp) -> String {
        let seconds = self.remaining(now).as_secs();

        format!("{}:{:02}", seconds / 60, seconds % 60)
    }
}

/// Provider-specific screen for a payment in progress.
#[derive(Debug, Clone, PartialEq)]
pub enum Processing {
    /// A QR code waiting to be scanned.
    Qr(QrSession),

    /// The hosted card form.
    Card {
        /// Payment being confirmed.
        payment_id: PaymentUuid,
        /// Secret for the form; absent when it couldn't be recovered, in
        /// which case the form can't be shown.
        client_secret: Option<ClientSecret>,
        /// The processor asked for extra authentication.
        awaiting_authentication: bool,
    },
}

impl Processing {
    /// A card form for `payment_id`.
    pub fn card(payment_id: PaymentUuid, client_secret: Option<ClientSecret>) -> Self {
        Self::Card {
            payment_id,
            client_secret,
            awaiting_authentication: false,
        }
    }

    /// Method being paid with.
    pub const fn method(&self) -> PaymentMethod {
        match self {
            Self::Qr(_) => PaymentMethod::QrTransfer,
            Self::Card { .. } => PaymentMethod::Card,
        }
    }

    /// Payment being processed.
    pub const fn payment_id(&self) -> PaymentUuid {
        match self {
            Self::Qr(session) => session.payment_id,
            Self::Card { payment_id, .. } => *payment_id,
        }
    }
}

/// Buttons offered once the flow can't go further by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OnwardAction {
    /// Follow the order.
    TrackOrder,
    /// Share the order.
    Share,
    /// Back to the menu.
    OrderAgain,
    /// Start another payment attempt.
    Retry,
    /// Talk to support.
    ContactSupport,
    /// Back to the cart.
    BackToCart,
    /// Pay with the other method.
    TryOtherMethod,
}

impl OnwardAction {
    /// Where the action goes, or `None` when it stays in the checkout.
    pub const fn destination(self, order_id: OrderUuid) -> Option<Destination> {
        match self {
            Self::TrackOrder => Some(Destination::OrderTracking(order_id)),
            Self::OrderAgain => Some(Destination::Catalog),
            Self::ContactSupport => Some(Destination::Support),
            Self::BackToCart => Some(Destination::Cart),
            Self::Share | Self::Retry | Self::TryOtherMethod => None,
        }
    }
}

/// Terminal outcome of a payment.
#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    /// Paid.
    Completed {
        /// The completed payment.
        payment: Payment,
    },
    /// The provider failed the payment.
    Failed {
        /// The failed payment.
        payment: Payment,
        /// Why, in words the customer can read.
        reason: String,
    },
}

/// Why the flow is in its error state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorBranch {
    /// The chosen method is down but the other one may work.
    MethodUnavailable(PaymentMethod),
    /// Anything else.
    General,
}

/// Where the checkout is.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowState {
    /// Nothing decided yet.
    Starting,
    /// A stored payment for this order can be picked up again.
    Recovery {
        /// The stored payment.
        payment: Payment,
    },
    /// Choosing a method.
    MethodSelection {
        /// What the checks found.
        availability: Availability,
    },
    /// Creating the payment with the backend.
    Initializing {
        /// Method being set up.
        method: PaymentMethod,
    },
    /// Waiting for the customer to pay.
    Processing(Processing),
    /// Waiting for the backend to see the payment.
    StatusTracking(Processing),
    /// Done, one way or the other.
    Confirmation(Confirmation),
    /// Something went wrong.
    Error {
        /// The classified failure.
        error: PaymentError,
        /// Which error screen applies.
        branch: ErrorBranch,
    },
    /// Neither method is up.
    Offline,
}

impl FlowState {
    /// Short name for logs and errors.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Recovery { .. } => "recovery",
            Self::MethodSelection { .. } => "method-selection",
            Self::Initializing { .. } => "payment-init",
            Self::Processing(_) => "processing",
            Self::StatusTracking(_) => "status-tracking",
            Self::Confirmation(_) => "confirmation",
            Self::Error { .. } => "error",
            Self::Offline => "offline-mode",
        }
    }

    /// Buttons to offer in this state.
    pub const fn onward_actions(&self) -> &'static [OnwardAction] {
        match self {
            Self::Confirmation(Confirmation::Completed { .. }) => &[
                OnwardAction::TrackOrder,
                OnwardAction::Share,
                OnwardAction::OrderAgain,
            ],
            Self::Confirmation(Confirmation::Failed { .. }) => {
                &[OnwardAction::Retry, OnwardAction::ContactSupport]
            }
            Self::Error {
                branch: ErrorBranch::MethodUnavailable(_),
                ..
            } => &[OnwardAction::TryOtherMethod, OnwardAction::BackToCart],
            Self::Error { .. } => &[OnwardAction::Retry, OnwardAction::BackToCart],
            Self::Offline => &[
                OnwardAction::Retry,
                OnwardAction::BackToCart,
                OnwardAction::ContactSupport,
            ],
            _ => &[],
        }
    }
}

/// An event that doesn't apply to the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {event} while {state}")]
pub struct FlowTransitionError {
    /// State the flow was in.
    pub state: &'static str,
    /// Rejected event.
    pub event: &'static str,
}

/// The checkout for one order.
#[derive(Debug, Clone)]
pub struct PaymentFlow {
    order_id: OrderUuid,
    state: FlowState,
    availability: Availability,
    retries: RetryBudget,
}

impl PaymentFlow {
    /// A fresh checkout for `order_id`.
    pub fn new(order_id: OrderUuid) -> Self {
        Self {
            order_id,
            state: FlowState::Starting,
            availability: Availability::ALL,
            retries: RetryBudget::default(),
        }
    }

    /// Order being paid for.
    pub fn order_id(&self) -> OrderUuid {
        self.order_id
    }

    /// Current state.
    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// Latest availability check.
    pub fn availability(&self) -> Availability {
        self.availability
    }

    /// Retries spent on this checkout.
    pub fn retries(&self) -> RetryBudget {
        self.retries
    }

    /// Whether the flow has reached its confirmation.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, FlowState::Confirmation(_))
    }

    /// Offer to resume `payment`.
    ///
    /// # Errors
    ///
    /// Only valid before anything else has happened, and only for a
    /// resumable payment of this order.
    pub fn enter_recovery(&mut self, payment: Payment) -> Result<(), FlowTransitionError> {
        let valid = matches!(self.state, FlowState::Starting)
            && payment.order_id == self.order_id
            && payment.is_resumable();

        if !valid {
            return Err(self.reject("offer recovery"));
        }

        self.transition(FlowState::Recovery { payment });

        Ok(())
    }

    /// Apply the availability checks. With nothing up the flow goes offline;
    /// if the previously chosen method is down it shows the unavailable
    /// screen; otherwise method selection.
    ///
    /// # Errors
    ///
    /// Valid when starting, offline or after an error.
    pub fn availability_checked(
        &mut self,
        availability: Availability,
        previously_selected: Option<PaymentMethod>,
    ) -> Result<(), FlowTransitionError> {
        if !matches!(
            self.state,
            FlowState::Starting | FlowState::Offline | FlowState::Error { .. }
        ) {
            return Err(self.reject("apply availability"));
        }

        self.availability = availability;

        let next = match previously_selected {
            _ if !availability.any() => FlowState::Offline,
            Some(method) if !availability.is_available(method) => FlowState::Error {
                error: classify(&ProviderFailure::MethodUnavailable(method)),
                branch: ErrorBranch::MethodUnavailable(method),
            },
            _ => FlowState::MethodSelection { availability },
        };

        self.transition(next);

        Ok(())
    }

    /// Pick a stored payment back up.
    ///
    /// # Errors
    ///
    /// Valid when starting or while offering recovery.
    pub fn resume(&mut self, processing: Processing) -> Result<(), FlowTransitionError> {
        if !matches!(self.state, FlowState::Starting | FlowState::Recovery { .. }) {
            return Err(self.reject("resume"));
        }

        self.transition(FlowState::Processing(processing));

        Ok(())
    }

    /// Decline the recovery offer and start over.
    ///
    /// # Errors
    ///
    /// Valid only while offering recovery.
    pub fn discard_recovery(&mut self) -> Result<(), FlowTransitionError> {
        if !matches!(self.state, FlowState::Recovery { .. }) {
            return Err(self.reject("discard recovery"));
        }

        self.transition(FlowState::Starting);

        Ok(())
    }

    /// The customer chose `method`. If it is down the flow shows the
    /// unavailable screen instead of initializing.
    ///
    /// # Errors
    ///
    /// Valid only during method selection.
    pub fn begin(&mut self, method: PaymentMethod) -> Result<(), FlowTransitionError> {
        let FlowState::MethodSelection { availability } = self.state else {
            return Err(self.reject("choose a method"));
        };

        let next = if availability.is_available(method) {
            FlowState::Initializing { method }
        } else {
            FlowState::Error {
                error: classify(&ProviderFailure::MethodUnavailable(method)),
                branch: ErrorBranch::MethodUnavailable(method),
            }
        };

        self.transition(next);

        Ok(())
    }

    /// The backend created the payment.
    ///
    /// # Errors
    ///
    /// Valid only while initializing the same method.
    pub fn created(&mut self, processing: Processing) -> Result<(), FlowTransitionError> {
        match self.state {
            FlowState::Initializing { method } if method == processing.method() => {
                self.transition(FlowState::Processing(processing));

                Ok(())
            }
            _ => Err(self.reject("finish initializing")),
        }
    }

    /// Swap in a freshly generated QR code.
    ///
    /// # Errors
    ///
    /// Valid only while a QR code is showing or being tracked.
    pub fn regenerate_qr(&mut self, session: QrSession) -> Result<(), FlowTransitionError> {
        match &self.state {
            FlowState::Processing(Processing::Qr(_)) | FlowState::StatusTracking(Processing::Qr(_)) => {
                self.transition(FlowState::Processing(Processing::Qr(session)));

                Ok(())
            }
            _ => Err(self.reject("regenerate the QR code")),
        }
    }

    /// The card processor wants extra authentication, which it handles
    /// itself.
    ///
    /// # Errors
    ///
    /// Valid only while the card form is showing.
    pub fn awaiting_authentication(&mut self) -> Result<(), FlowTransitionError> {
        match &mut self.state {
            FlowState::Processing(Processing::Card {
                awaiting_authentication,
                ..
            }) => {
                *awaiting_authentication = true;

                Ok(())
            }
            _ => Err(self.reject("await authentication")),
        }
    }

    /// Hand the payment to the status poller.
    ///
    /// # Errors
    ///
    /// Valid only while processing.
    pub fn track(&mut self) -> Result<(), FlowTransitionError> {
        match &self.state {
            FlowState::Processing(processing) => {
                let processing = processing.clone();

                self.transition(FlowState::StatusTracking(processing));

                Ok(())
            }
            _ => Err(self.reject("track status")),
        }
    }

    /// The payment completed. Returns `true` the first time, which is the
    /// caller's cue to empty the cart; seeing the same completion again
    /// returns `false`.
    ///
    /// # Errors
    ///
    /// Valid while processing, tracking or offering recovery, and only for a
    /// completed payment of this order.
    pub fn complete(&mut self, payment: Payment) -> Result<bool, FlowTransitionError> {
        if payment.status != PaymentStatus::Completed || payment.order_id != self.order_id {
            return Err(self.reject("complete"));
        }

        match &self.state {
            FlowState::Confirmation(Confirmation::Completed { payment: done }) if done.id == payment.id => {
                Ok(false)
            }
            FlowState::Processing(_) | FlowState::StatusTracking(_) | FlowState::Recovery { .. } => {
                self.transition(FlowState::Confirmation(Confirmation::Completed { payment }));

                Ok(true)
            }
            _ => Err(self.reject("complete")),
        }
    }

    /// The provider failed the payment.
    ///
    /// # Errors
    ///
    /// Valid while processing or tracking.
    pub fn fail_payment(&mut self, payment: Payment, reason: impl Into<String>) -> Result<(), FlowTransitionError> {
        if !matches!(
            self.state,
            FlowState::Processing(_) | FlowState::StatusTracking(_)
        ) {
            return Err(self.reject("fail the payment"));
        }

        self.transition(FlowState::Confirmation(Confirmation::Failed {
            payment,
            reason: reason.into(),
        }));

        Ok(())
    }

    /// Tracking gave up without a terminal status. The payment screen comes
    /// back so the customer can check again.
    ///
    /// # Errors
    ///
    /// Valid only while tracking.
    pub fn timed_out(&mut self) -> Result<(), FlowTransitionError> {
        match &self.state {
            FlowState::StatusTracking(processing) => {
                let processing = processing.clone();

                self.transition(FlowState::Processing(processing));

                Ok(())
            }
            _ => Err(self.reject("time out")),
        }
    }

    /// Show `error`.
    ///
    /// # Errors
    ///
    /// A finished flow stays finished.
    pub fn fail(&mut self, error: PaymentError) -> Result<(), FlowTransitionError> {
        if self.is_finished() {
            return Err(self.reject("fail"));
        }

        self.transition(FlowState::Error {
            error,
            branch: ErrorBranch::General,
        });

        Ok(())
    }

    /// Start another attempt. Spends from the retry budget; once it is spent
    /// the state stays put and the caller points at support.
    ///
    /// # Errors
    ///
    /// Valid after an error, a failed payment, or while offline.
    pub fn retry(&mut self) -> Result<RetryDecision, FlowTransitionError> {
        let next = match &self.state {
            FlowState::Error { .. } | FlowState::Confirmation(Confirmation::Failed { .. }) => {
                FlowState::MethodSelection {
                    availability: self.availability,
                }
            }
            FlowState::Offline => FlowState::Starting,
            _ => return Err(self.reject("retry")),
        };

        let decision = self.retries.try_consume();

        if let RetryDecision::Retry { .. } = decision {
            self.transition(next);
        }

        Ok(decision)
    }

    /// Go back to method selection after a method turned out to be down.
    ///
    /// # Errors
    ///
    /// Valid only on the unavailable screen.
    pub fn choose_other_method(&mut self) -> Result<(), FlowTransitionError> {
        match self.state {
            FlowState::Error {
                branch: ErrorBranch::MethodUnavailable(method),
                ..
            } => {
                let mut availability = self.availability;

                match method {
                    PaymentMethod::QrTransfer => availability.qr_transfer = false,
                    PaymentMethod::Card => availability.card = false,
                }

                self.availability = availability;
                self.transition(FlowState::MethodSelection { availability });

                Ok(())
            }
            _ => Err(self.reject("choose another method")),
        }
    }

    fn transition(&mut self, next: FlowState) {
        debug!(
            order_id = %self.order_id,
            from = self.state.name(),
            to = next.name(),
            "payment flow transition"
        );

        self.state = next;
    }

    fn reject(&self, event: &'static str) -> FlowTransitionError {
        FlowTransitionError {
            state: self.state.name(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::{decimal::Amount, payments::errors::ErrorCode};

    use super::*;

    fn payment(order_id: OrderUuid, method: PaymentMethod, status: PaymentStatus) -> Payment {
        Payment {
            id: PaymentUuid::now_v7(),
            order_id,
            method,
            status,
            amount: Amount::from_cents(676),
            paynow_qr_data: None,
            provider_payment_id: None,
            failure_reason: None,
            created_at: Timestamp::UNIX_EPOCH,
            updated_at: Timestamp::UNIX_EPOCH,
        }
    }

    fn qr_session(payment_id: PaymentUuid) -> QrSession {
        QrSession::new(payment_id, "00020101021226", Timestamp::UNIX_EPOCH, None)
    }

    fn selecting(order_id: OrderUuid) -> Result<PaymentFlow, FlowTransitionError> {
        let mut flow = PaymentFlow::new(order_id);

        flow.availability_checked(Availability::ALL, None)?;

        Ok(flow)
    }

    #[test]
    fn qr_payment_happy_path() -> TestResult {
        let order_id = OrderUuid::now_v7();
        let mut flow = selecting(order_id)?;
        let record = payment(order_id, PaymentMethod::QrTransfer, PaymentStatus::Completed);

        flow.begin(PaymentMethod::QrTransfer)?;
        flow.created(Processing::Qr(qr_session(record.id)))?;
        flow.track()?;

        assert!(flow.complete(record.clone())?);
        assert!(!flow.complete(record)?);
        assert!(flow.is_finished());
        assert_eq!(
            flow.state().onward_actions(),
            &[OnwardAction::TrackOrder, OnwardAction::Share, OnwardAction::OrderAgain]
        );

        Ok(())
    }

    #[test]
    fn nothing_available_goes_offline() -> TestResult {
        let mut flow = PaymentFlow::new(OrderUuid::now_v7());

        flow.availability_checked(
            Availability {
                qr_transfer: false,
                card: false,
            },
            None,
        )?;

        assert_eq!(flow.state(), &FlowState::Offline);
        assert!(flow.availability().methods().is_empty());
        assert!(flow.state().onward_actions().contains(&OnwardAction::ContactSupport));

        Ok(())
    }

    #[test]
    fn previously_selected_method_down_shows_the_unavailable_screen() -> TestResult {
        let mut flow = PaymentFlow::new(OrderUuid::now_v7());
        let availability = Availability {
            qr_transfer: true,
            card: false,
        };

        flow.availability_checked(availability, Some(PaymentMethod::Card))?;

        let FlowState::Error { error, branch } = flow.state() else {
            return Err("expected the error state".into());
        };

        assert_eq!(*branch, ErrorBranch::MethodUnavailable(PaymentMethod::Card));
        assert_eq!(availability.methods().as_slice(), &[PaymentMethod::QrTransfer]);
        assert_eq!(error.code, ErrorCode::MethodUnavailable);

        flow.choose_other_method()?;

        assert_eq!(flow.state(), &FlowState::MethodSelection { availability });

        Ok(())
    }

    #[test]
    fn choosing_a_down_method_is_refused() -> TestResult {
        let mut flow = PaymentFlow::new(OrderUuid::now_v7());

        flow.availability_checked(
            Availability {
                qr_transfer: false,
                card: true,
            },
            None,
        )?;
        flow.begin(PaymentMethod::QrTransfer)?;

        assert!(matches!(
            flow.state(),
            FlowState::Error {
                branch: ErrorBranch::MethodUnavailable(PaymentMethod::QrTransfer),
                ..
            }
        ));

        Ok(())
    }

    #[test]
    fn created_must_match_the_chosen_method() -> TestResult {
        let mut flow = selecting(OrderUuid::now_v7())?;

        flow.begin(PaymentMethod::Card)?;

        let result = flow.created(Processing::Qr(qr_session(PaymentUuid::now_v7())));

        assert_eq!(
            result,
            Err(FlowTransitionError {
                state: "payment-init",
                event: "finish initializing",
            })
        );

        Ok(())
    }

    #[test]
    fn recovery_resumes_or_restarts() -> TestResult {
        let order_id = OrderUuid::now_v7();
        let stored = payment(order_id, PaymentMethod::QrTransfer, PaymentStatus::Pending);

        let mut resumed = PaymentFlow::new(order_id);
        resumed.enter_recovery(stored.clone())?;
        resumed.resume(Processing::Qr(qr_session(stored.id)))?;

        assert_eq!(resumed.state().name(), "processing");

        let mut restarted = PaymentFlow::new(order_id);
        restarted.enter_recovery(stored)?;
        restarted.discard_recovery()?;

        assert_eq!(restarted.state(), &FlowState::Starting);

        Ok(())
    }

    #[test]
    fn recovery_needs_a_resumable_payment_of_this_order() {
        let order_id = OrderUuid::now_v7();
        let mut flow = PaymentFlow::new(order_id);

        let other_order = payment(OrderUuid::now_v7(), PaymentMethod::Card, PaymentStatus::Pending);
        let finished = payment(order_id, PaymentMethod::Card, PaymentStatus::Completed);

        assert!(flow.enter_recovery(other_order).is_err());
        assert!(flow.enter_recovery(finished).is_err());
        assert_eq!(flow.state(), &FlowState::Starting);
    }

    #[test]
    fn timeout_returns_to_the_payment_screen() -> TestResult {
        let order_id = OrderUuid::now_v7();
        let mut flow = selecting(order_id)?;
        let session = qr_session(PaymentUuid::now_v7());

        flow.begin(PaymentMethod::QrTransfer)?;
        flow.created(Processing::Qr(session.clone()))?;
        flow.track()?;
        flow.timed_out()?;

        assert_eq!(flow.state(), &FlowState::Processing(Processing::Qr(session)));

        Ok(())
    }

    #[test]
    fn regenerating_the_qr_code_replaces_the_session() -> TestResult {
        let mut flow = selecting(OrderUuid::now_v7())?;
        let first = qr_session(PaymentUuid::now_v7());
        let second = QrSession::new(
            PaymentUuid::now_v7(),
            "00020101021227",
            Timestamp::from_second(900)?,
            None,
        );

        flow.begin(PaymentMethod::QrTransfer)?;
        flow.created(Processing::Qr(first))?;
        flow.regenerate_qr(second.clone())?;

        assert_eq!(flow.state(), &FlowState::Processing(Processing::Qr(second)));

        Ok(())
    }

    #[test]
    fn card_authentication_is_flagged() -> TestResult {
        let mut flow = selecting(OrderUuid::now_v7())?;
        let payment_id = PaymentUuid::now_v7();

        flow.begin(PaymentMethod::Card)?;
        flow.created(Processing::card(payment_id, Some(ClientSecret::new("pi_secret"))))?;
        flow.awaiting_authentication()?;

        assert!(matches!(
            flow.state(),
            FlowState::Processing(Processing::Card {
                awaiting_authentication: true,
                ..
            })
        ));

        Ok(())
    }

    #[test]
    fn failed_payments_offer_retry_until_the_budget_runs_out() -> TestResult {
        let order_id = OrderUuid::now_v7();
        let mut flow = selecting(order_id)?;

        for attempt in 1..=2 {
            flow.begin(PaymentMethod::Card)?;
            flow.created(Processing::card(PaymentUuid::now_v7(), None))?;
            flow.fail_payment(
                payment(order_id, PaymentMethod::Card, PaymentStatus::Failed),
                "Payment failed",
            )?;

            assert_eq!(flow.retry()?, RetryDecision::Retry { attempt, max: 3 });
        }

        flow.begin(PaymentMethod::Card)?;
        flow.created(Processing::card(PaymentUuid::now_v7(), None))?;
        flow.fail_payment(
            payment(order_id, PaymentMethod::Card, PaymentStatus::Failed),
            "Payment failed",
        )?;

        assert_eq!(flow.retry()?, RetryDecision::Exhausted);
        assert!(flow.is_finished());

        Ok(())
    }

    #[test]
    fn retry_budgets_are_per_flow() -> TestResult {
        let mut first = PaymentFlow::new(OrderUuid::now_v7());
        first.fail(classify(&ProviderFailure::Offline))?;
        first.retry()?;
        first.fail(classify(&ProviderFailure::Offline))?;
        first.retry()?;

        let second = PaymentFlow::new(OrderUuid::now_v7());

        assert_eq!(first.retries().attempts(), 2);
        assert_eq!(second.retries().attempts(), 0);

        Ok(())
    }

    #[test]
    fn finished_flows_ignore_errors() -> TestResult {
        let order_id = OrderUuid::now_v7();
        let mut flow = selecting(order_id)?;

        flow.begin(PaymentMethod::QrTransfer)?;
        flow.created(Processing::Qr(qr_session(PaymentUuid::now_v7())))?;
        flow.complete(payment(order_id, PaymentMethod::QrTransfer, PaymentStatus::Completed))?;

        assert!(flow.fail(classify(&ProviderFailure::Offline)).is_err());

        Ok(())
    }

    #[test]
    fn qr_countdown_runs_down_to_zero() -> TestResult {
        let session = qr_session(PaymentUuid::now_v7());

        assert_eq!(session.countdown(Timestamp::UNIX_EPOCH), "15:00");
        assert_eq!(session.countdown(Timestamp::from_second(61)?), "13:59");
        assert!(!session.is_expired(Timestamp::from_second(899)?));
        assert!(session.is_expired(Timestamp::from_second(900)?));
        assert_eq!(session.countdown(Timestamp::from_second(1_000)?), "0:00");

        Ok(())
    }

    #[test]
    fn destinations_have_paths() {
        let order = OrderUuid::now_v7();

        assert_eq!(Destination::Catalog.path(), "/menu");
        assert_eq!(Destination::OrderTracking(order).path(), format!("/orders/{order}"));
        assert_eq!(
            OnwardAction::TrackOrder.destination(order),
            Some(Destination::OrderTracking(order))
        );
        assert_eq!(OnwardAction::Retry.destination(order), None);
    }
}
