//! Payment flow controller
//!
//! Performs the I/O behind each checkout step and feeds the results to the
//! [`PaymentFlow`] state machine, keeping the payment store and the cart in
//! step with it.

use std::{fmt, sync::Arc};

use brew::{
    cart::Cart,
    clock::Clock,
    decimal::Amount,
    orders::{Order, OrderUuid},
    payments::{
        errors::{PaymentError, ProviderFailure, RetryDecision, classify},
        flow::{
            Availability, Destination, FlowState, FlowTransitionError, OnwardAction, PaymentFlow,
            Processing, QrSession,
        },
        models::{Payment, PaymentMethod, PaymentStatus, PaymentUuid},
        store::PaymentStore,
    },
    persistence::Persistence,
};
use jiff::Timestamp;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    api::{ApiError, OrdersApi, PaymentsApi},
    checkout::poller::{PaymentPoller, PollHandler, PollOutcome, PollerConfig, PollerError},
    notify::{Notification, Notifier, Severity},
    shared::Shared,
};

/// What the checkout needs from the rest of the app.
#[derive(Clone)]
pub struct CheckoutDeps {
    /// Payment endpoints.
    pub payments: Arc<dyn PaymentsApi>,
    /// Order endpoints.
    pub orders: Arc<dyn OrdersApi>,
    /// Customer notifications.
    pub notifier: Arc<dyn Notifier>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Local storage for the cart and payment snapshots.
    pub persistence: Persistence,
    /// The customer's cart.
    pub cart: Shared<Cart>,
    /// The in-flight payment.
    pub payment_store: Shared<PaymentStore>,
    /// Status polling settings.
    pub poller: PollerConfig,
    /// Whether a card publishable key is configured.
    pub card_enabled: bool,
}

impl fmt::Debug for CheckoutDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckoutDeps")
            .field("poller", &self.poller)
            .field("card_enabled", &self.card_enabled)
            .finish_non_exhaustive()
    }
}

/// What the hosted card form reported after confirming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardConfirmation {
    /// The card was charged.
    Succeeded,
    /// The processor is still working on it.
    Processing,
    /// The bank wants the customer to authenticate.
    RequiresAction,
    /// The processor refused the card.
    Declined {
        /// The processor's error `type`.
        kind: String,
        /// The processor's decline `code`.
        code: Option<String>,
    },
    /// Any other status.
    Unexpected(String),
}

/// Errors driving the checkout.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The checkout was opened without an order.
    #[error("no order ID provided")]
    MissingOrder,

    /// The step isn't valid in the current state.
    #[error(transparent)]
    Flow(#[from] FlowTransitionError),

    /// Status polling could not start.
    #[error(transparent)]
    Poller(#[from] PollerError),
}

impl ControllerError {
    /// Where to send the customer, if the error leaves the checkout.
    pub fn destination(&self) -> Option<Destination> {
        match self {
            Self::MissingOrder => Some(Destination::Cart),
            Self::Flow(_) | Self::Poller(_) => None,
        }
    }
}

/// Drives one order through payment.
pub struct PaymentFlowController {
    flow: PaymentFlow,
    deps: CheckoutDeps,
    poller: PaymentPoller,
}

impl fmt::Debug for PaymentFlowController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentFlowController")
            .field("flow", &self.flow)
            .field("poller", &self.poller)
            .finish_non_exhaustive()
    }
}

impl PaymentFlowController {
    /// Open the checkout for `order_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::MissingOrder`] without an order; the
    /// customer is told to go back to the cart.
    pub fn open(deps: CheckoutDeps, order_id: Option<OrderUuid>) -> Result<Self, ControllerError> {
        let Some(order_id) = order_id else {
            deps.notifier.notify(Notification::new(
                "Missing Order",
                "No order ID provided. Please return to cart.",
                Severity::Warning,
            ));

            return Err(ControllerError::MissingOrder);
        };

        let poller = PaymentPoller::new(
            Arc::clone(&deps.payments),
            deps.payment_store.clone(),
            Arc::clone(&deps.notifier),
            Arc::clone(&deps.clock),
            deps.poller,
        );

        Ok(Self {
            flow: PaymentFlow::new(order_id),
            deps,
            poller,
        })
    }

    /// The order being paid for.
    pub fn order_id(&self) -> OrderUuid {
        self.flow.order_id()
    }

    /// The current step.
    pub fn state(&self) -> &FlowState {
        self.flow.state()
    }

    /// The state machine.
    pub fn flow(&self) -> &PaymentFlow {
        &self.flow
    }

    /// Start the checkout. A stored payment for this order is either offered
    /// for recovery (`resume`) or picked up directly; otherwise the methods'
    /// availability is checked.
    ///
    /// # Errors
    ///
    /// Returns a [`ControllerError`] if called twice.
    pub async fn initialize(&mut self, resume: bool) -> Result<(), ControllerError> {
        let candidate = self
            .deps
            .payment_store
            .lock()
            .resume_candidate(self.flow.order_id())
            .cloned();

        match candidate {
            Some(payment) if resume => {
                info!(order_id = %self.flow.order_id(), payment_id = %payment.id, "offering payment recovery");

                self.flow.enter_recovery(payment)?;

                Ok(())
            }
            Some(payment) => self.resume_payment(payment).await,
            None => self.check_availability().await,
        }
    }

    /// Answer the recovery prompt: carry on with the stored payment, or drop
    /// it and start over.
    ///
    /// # Errors
    ///
    /// Returns a [`ControllerError`] unless recovery is being offered.
    pub async fn resolve_recovery(&mut self, resume: bool) -> Result<(), ControllerError> {
        let FlowState::Recovery { payment } = self.flow.state() else {
            return Err(self.reject("resolve recovery"));
        };

        if resume {
            let payment = payment.clone();

            return self.resume_payment(payment).await;
        }

        self.flow.discard_recovery()?;
        self.deps.payment_store.with(PaymentStore::reset);
        self.persist_payment();

        self.check_availability().await
    }

    /// Ask both methods whether they're up, in parallel, and move to method
    /// selection, offline mode, or the method-unavailable error.
    ///
    /// # Errors
    ///
    /// Returns a [`ControllerError`] outside the starting, offline and error
    /// states.
    pub async fn check_availability(&mut self) -> Result<(), ControllerError> {
        let (qr_transfer, card) = tokio::join!(
            self.deps.payments.method_available(PaymentMethod::QrTransfer),
            self.deps.payments.method_available(PaymentMethod::Card),
        );

        let availability = Availability {
            qr_transfer: assume_available(PaymentMethod::QrTransfer, qr_transfer),
            card: assume_available(PaymentMethod::Card, card),
        };

        let selected = self.deps.payment_store.lock().selected_method();

        self.flow.availability_checked(availability, selected)?;

        match self.flow.state() {
            FlowState::Offline => warn!(order_id = %self.flow.order_id(), "payments offline"),
            FlowState::Error { error, .. } => {
                self.deps
                    .payment_store
                    .with(|store| store.set_error(Some(error.message.clone())));
            }
            _ => debug!(order_id = %self.flow.order_id(), ?availability, "payment methods checked"),
        }

        Ok(())
    }

    /// Pay with `method`: reuse a matching unfinished payment or create one.
    ///
    /// # Errors
    ///
    /// Returns a [`ControllerError`] outside method selection. Provider
    /// failures move the flow to its error state instead.
    pub async fn select_method(&mut self, method: PaymentMethod) -> Result<(), ControllerError> {
        self.flow.begin(method)?;

        if let FlowState::Error { error, .. } = self.flow.state() {
            self.deps
                .payment_store
                .with(|store| store.set_error(Some(error.message.clone())));
            self.deps.notifier.notify(Notification::payment_error(error));

            return Ok(());
        }

        self.deps.payment_store.with(|store| {
            store.select_payment_method(method);
            store.set_processing(true);
        });

        if method == PaymentMethod::Card && !self.deps.card_enabled {
            let error = classify(&ProviderFailure::CardUnconfigured);

            return self.fail(error, "Payment Error");
        }

        let order_id = self.flow.order_id();
        let existing = self
            .deps
            .payment_store
            .lock()
            .payment()
            .filter(|payment| payment.method == method && payment.order_id == order_id && payment.is_resumable())
            .cloned();

        let processing = match existing {
            Some(payment) => {
                debug!(%order_id, payment_id = %payment.id, "reusing existing payment");

                self.processing_for(&payment).await
            }
            None => self.create_payment(method).await,
        };
        let processing = match processing {
            Ok(processing) => processing,
            Err(api_error) => {
                let error = classify(&api_error.provider_failure(method, "initialization"));

                error!(%order_id, %method, error = %api_error, code = %error.code, "payment creation failed");

                return self.fail(error, "Payment Error");
            }
        };

        self.deps.payment_store.with(|store| store.set_processing(false));
        self.flow.created(processing)?;
        self.persist_payment();

        Ok(())
    }

    /// Replace an expired QR code. Returns whether a new one was issued.
    ///
    /// # Errors
    ///
    /// Returns a [`ControllerError`] unless a QR payment is in progress.
    pub async fn check_qr_expiry(&mut self) -> Result<bool, ControllerError> {
        let expired = match self.flow.state() {
            FlowState::Processing(Processing::Qr(session)) | FlowState::StatusTracking(Processing::Qr(session)) => {
                session.is_expired(self.deps.clock.now())
            }
            _ => return Err(self.reject("check the QR code")),
        };

        if !expired {
            return Ok(false);
        }

        self.deps.notifier.notify(Notification::new(
            "QR Code Expired",
            "Generating a new QR code...",
            Severity::Warning,
        ));

        self.regenerate_qr().await
    }

    /// Ask for a fresh QR code. Returns whether one was issued; a failed
    /// request leaves the current code in place.
    ///
    /// # Errors
    ///
    /// Returns a [`ControllerError`] unless a QR payment is in progress.
    pub async fn regenerate_qr(&mut self) -> Result<bool, ControllerError> {
        if !matches!(
            self.flow.state(),
            FlowState::Processing(Processing::Qr(_)) | FlowState::StatusTracking(Processing::Qr(_))
        ) {
            return Err(self.reject("regenerate the QR code"));
        }

        self.poller.stop_polling();

        match self.create_qr().await {
            Ok(session) => {
                info!(order_id = %self.flow.order_id(), payment_id = %session.payment_id, "qr code regenerated");

                self.flow.regenerate_qr(session)?;
                self.persist_payment();

                Ok(true)
            }
            Err(api_error) => {
                warn!(order_id = %self.flow.order_id(), error = %api_error, "qr refresh failed");

                self.deps.notifier.notify(Notification::new(
                    "QR Refresh Failed",
                    "Please refresh the page or try again",
                    Severity::Warning,
                ));

                Ok(false)
            }
        }
    }

    /// Handle the card form's confirmation result. After a success or a
    /// processing result, call [`PaymentFlowController::track_status`].
    ///
    /// # Errors
    ///
    /// Returns a [`ControllerError`] unless a card payment is in progress.
    pub fn card_submitted(&mut self, confirmation: CardConfirmation) -> Result<(), ControllerError> {
        if !matches!(self.flow.state(), FlowState::Processing(Processing::Card { .. })) {
            return Err(self.reject("confirm the card payment"));
        }

        match confirmation {
            CardConfirmation::Succeeded => self.deps.notifier.notify(Notification::new(
                "Payment Successful!",
                "Redirecting to confirmation...",
                Severity::Success,
            )),
            CardConfirmation::Processing => self.deps.notifier.notify(Notification::new(
                "Payment Processing",
                "This may take a few moments...",
                Severity::Info,
            )),
            CardConfirmation::RequiresAction => {
                self.flow.awaiting_authentication()?;
                self.deps.notifier.notify(Notification::new(
                    "Authentication Required",
                    "Please complete 3D Secure verification",
                    Severity::Info,
                ));
            }
            CardConfirmation::Declined { kind, code } => {
                let error = classify(&ProviderFailure::Card { kind, code });

                return self.fail(error, "Payment Failed");
            }
            CardConfirmation::Unexpected(status) => {
                warn!(order_id = %self.flow.order_id(), %status, "unexpected card payment status");

                let error = classify(&ProviderFailure::Card {
                    kind: "api_error".to_string(),
                    code: None,
                });

                return self.fail(error, "Payment Failed");
            }
        }

        Ok(())
    }

    /// Poll the payment until it settles. On completion the cart is emptied,
    /// once, and the confirmation page is returned.
    ///
    /// # Errors
    ///
    /// Returns a [`ControllerError`] unless a payment is in progress.
    pub async fn track_status(&mut self) -> Result<Option<Destination>, ControllerError> {
        if matches!(self.flow.state(), FlowState::Processing(_)) {
            self.flow.track()?;
        }

        let FlowState::StatusTracking(processing) = self.flow.state() else {
            return Err(self.reject("track status"));
        };

        let payment_id = processing.payment_id();
        let handler = Arc::new(StatusNotices {
            notifier: Arc::clone(&self.deps.notifier),
        });

        self.poller.start_polling(payment_id, handler)?;

        let outcome = self.poller.join().await;

        self.persist_payment();

        match outcome {
            PollOutcome::Completed(payment) => {
                let payment_id = payment.id;

                if self.flow.complete(payment)? {
                    self.deps.cart.with(Cart::checkout_complete);
                    self.persist_cart();

                    info!(order_id = %self.flow.order_id(), %payment_id, "checkout complete");
                }

                Ok(Some(Destination::Confirmation {
                    order: self.flow.order_id(),
                    payment: payment_id,
                }))
            }
            PollOutcome::Failed { payment, reason } => {
                self.flow.fail_payment(payment, reason)?;

                Ok(None)
            }
            PollOutcome::TimedOut => {
                self.flow.timed_out()?;

                Ok(None)
            }
            PollOutcome::Aborted(error) => {
                self.flow.fail(error)?;

                Ok(None)
            }
            PollOutcome::Stopped => Ok(None),
        }
    }

    /// Try again from an error, a failed payment, or offline mode. Spends
    /// from this payment's retry budget; once it runs out nothing changes.
    ///
    /// # Errors
    ///
    /// Returns a [`ControllerError`] from any other state.
    pub async fn retry(&mut self) -> Result<RetryDecision, ControllerError> {
        let context = self
            .deps
            .payment_store
            .lock()
            .selected_method()
            .map_or("payment", PaymentMethod::label);

        let decision = self.flow.retry()?;

        self.deps.notifier.notify(Notification::retry(decision, context));

        if let RetryDecision::Retry { attempt, max } = decision {
            info!(order_id = %self.flow.order_id(), attempt, max, "retrying payment");

            if matches!(self.flow.state(), FlowState::Starting) {
                self.check_availability().await?;
            } else {
                self.deps.payment_store.with(PaymentStore::reset);
                self.persist_payment();
            }
        }

        Ok(decision)
    }

    /// Leave a method that's down and pick from the rest.
    ///
    /// # Errors
    ///
    /// Returns a [`ControllerError`] unless a method was reported
    /// unavailable.
    pub fn choose_other_method(&mut self) -> Result<(), ControllerError> {
        self.flow.choose_other_method()?;
        self.deps.payment_store.with(|store| store.set_error(None));

        Ok(())
    }

    /// Where an onward action leads, if it leaves the checkout.
    pub fn destination(&self, action: OnwardAction) -> Option<Destination> {
        action.destination(self.flow.order_id())
    }

    /// The order, for the confirmation page.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] if the fetch fails.
    pub async fn load_order(&self) -> Result<Order, ApiError> {
        self.deps.orders.get_order(self.flow.order_id()).await
    }

    /// Stop polling and save what can be resumed.
    pub fn teardown(&mut self) {
        self.poller.stop_polling();
        self.persist_payment();

        debug!(order_id = %self.flow.order_id(), state = self.flow.state().name(), "checkout closed");
    }

    async fn resume_payment(&mut self, payment: Payment) -> Result<(), ControllerError> {
        info!(order_id = %self.flow.order_id(), payment_id = %payment.id, method = %payment.method, "resuming payment");

        self.deps
            .payment_store
            .with(|store| store.select_payment_method(payment.method));

        let processing = match self.processing_for(&payment).await {
            Ok(processing) => processing,
            Err(api_error) => {
                let error = classify(&api_error.provider_failure(payment.method, "initialization"));

                error!(payment_id = %payment.id, error = %api_error, code = %error.code, "payment could not be resumed");

                return self.fail(error, "Payment Error");
            }
        };

        self.flow.resume(processing)?;
        self.persist_payment();

        Ok(())
    }

    /// Rebuild the processing step for a payment created earlier. A QR
    /// payment without its code, or a card payment without its client
    /// secret, is replaced by a fresh one and the store follows it.
    async fn processing_for(&self, payment: &Payment) -> Result<Processing, ApiError> {
        match payment.method {
            PaymentMethod::QrTransfer => {
                let stored = self.deps.payment_store.lock().qr_code_url().map(str::to_string);

                match stored.or_else(|| payment.paynow_qr_data.clone()) {
                    Some(payload) => Ok(Processing::Qr(QrSession::new(payment.id, payload, payment.created_at, None))),
                    None => {
                        info!(payment_id = %payment.id, "stored qr payment has no code, issuing a new one");

                        self.create_qr().await.map(Processing::Qr)
                    }
                }
            }
            PaymentMethod::Card => {
                let stored = self.deps.payment_store.lock().client_secret().cloned();

                if let Some(secret) = stored {
                    return Ok(Processing::card(payment.id, Some(secret)));
                }

                let processing = self.create_payment(PaymentMethod::Card).await?;

                if processing.payment_id() != payment.id {
                    info!(
                        previous = %payment.id,
                        payment_id = %processing.payment_id(),
                        "card payment replaced to get a client secret"
                    );
                }

                Ok(processing)
            }
        }
    }

    async fn create_payment(&self, method: PaymentMethod) -> Result<Processing, ApiError> {
        match method {
            PaymentMethod::QrTransfer => self.create_qr().await.map(Processing::Qr),
            PaymentMethod::Card => {
                let order_id = self.flow.order_id();
                let amount = self.amount();
                let created = self.deps.payments.create_card_payment(order_id, amount).await?;
                let record = pending_payment(created.payment_id, order_id, method, amount, None, self.deps.clock.now());

                self.deps.payment_store.with(|store| {
                    store.set_payment(record);
                    store.set_client_secret(created.client_secret.clone());
                });

                Ok(Processing::card(created.payment_id, created.client_secret))
            }
        }
    }

    async fn create_qr(&self) -> Result<QrSession, ApiError> {
        let order_id = self.flow.order_id();
        let created = self.deps.payments.create_qr_payment(order_id).await?;
        let now = self.deps.clock.now();
        let session = QrSession::new(created.payment_id, created.qr_code_url.clone(), now, created.expires_at);
        let record = pending_payment(
            created.payment_id,
            order_id,
            PaymentMethod::QrTransfer,
            self.amount(),
            Some(created.qr_code_url.clone()),
            now,
        );

        self.deps.payment_store.with(|store| {
            store.set_payment(record);
            store.set_qr_code_url(Some(created.qr_code_url));
        });

        Ok(session)
    }

    fn fail(&mut self, error: PaymentError, title: &str) -> Result<(), ControllerError> {
        self.deps
            .payment_store
            .with(|store| store.set_error(Some(error.message.clone())));
        self.deps.notifier.notify(Notification::new(
            title,
            error.message.clone(),
            Severity::Destructive,
        ));
        self.flow.fail(error)?;

        Ok(())
    }

    fn amount(&self) -> Amount {
        self.deps.cart.lock().total()
    }

    fn persist_payment(&self) {
        if let Err(error) = self.deps.payment_store.lock().save(&self.deps.persistence) {
            warn!(%error, "could not save payment");
        }
    }

    fn persist_cart(&self) {
        if let Err(error) = self.deps.cart.lock().save(&self.deps.persistence) {
            warn!(%error, "could not save cart");
        }
    }

    fn reject(&self, event: &'static str) -> ControllerError {
        FlowTransitionError {
            state: self.flow.state().name(),
            event,
        }
        .into()
    }
}

/// Treat a failed availability check as "up"; the payment attempt itself
/// will say otherwise.
fn assume_available(method: PaymentMethod, checked: Result<bool, ApiError>) -> bool {
    checked.unwrap_or_else(|error| {
        warn!(%method, %error, "availability check failed, assuming available");

        true
    })
}

fn pending_payment(
    id: PaymentUuid,
    order_id: OrderUuid,
    method: PaymentMethod,
    amount: Amount,
    paynow_qr_data: Option<String>,
    now: Timestamp,
) -> Payment {
    Payment {
        id,
        order_id,
        method,
        status: PaymentStatus::Pending,
        amount,
        paynow_qr_data,
        provider_payment_id: None,
        failure_reason: None,
        created_at: now,
        updated_at: now,
    }
}

/// Notices shown by the status tracker.
struct StatusNotices {
    notifier: Arc<dyn Notifier>,
}

impl PollHandler for StatusNotices {
    fn on_complete(&self, payment: &Payment) {
        debug!(payment_id = %payment.id, "status tracker saw completion");

        self.notifier.notify(Notification::new(
            "Payment Completed!",
            "Redirecting to confirmation...",
            Severity::Success,
        ));
    }

    fn on_failed(&self, reason: &str) {
        debug!(%reason, "status tracker saw failure");
    }
}
