//! Payment status poller
//!
//! Asks the backend for a payment's status on a fixed interval until it is
//! completed or failed, or until the retry bound runs out. Every run carries
//! a generation number; a response that lands after the run was stopped or
//! replaced is dropped without touching the store.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use brew::{
    clock::Clock,
    payments::{
        errors::{PaymentError, ProviderFailure, classify},
        models::{Payment, PaymentMethod, PaymentStatus, PaymentUuid, StatusTransitionError},
        store::PaymentStore,
    },
};
use mockall::automock;
use thiserror::Error;
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    api::{ApiError, PaymentsApi},
    config::PollingConfig,
    notify::{Notification, Notifier, Severity},
    shared::Shared,
};

/// Shown while transient failures are retried.
pub const TRANSIENT_ERROR_MESSAGE: &str = "Network error. Retrying...";

/// Shown when the retry bound runs out.
pub const TIMEOUT_MESSAGE: &str = "Payment confirmation timeout. Please check your email for confirmation.";

/// Failure reason used when the backend gives none.
pub const DEFAULT_FAILURE_REASON: &str = "Payment failed";

/// Interval and retry bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between checks; the first check is one interval after start.
    pub interval: Duration,
    /// Checks without a terminal status before giving up.
    pub max_retries: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(3_000),
            max_retries: 30,
        }
    }
}

impl From<&PollingConfig> for PollerConfig {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: config.interval(),
            max_retries: config.poll_max_retries,
        }
    }
}

/// Called when polling reaches an outcome.
#[automock]
pub trait PollHandler: Send + Sync {
    /// The payment completed.
    fn on_complete(&self, payment: &Payment);

    /// The payment failed with `reason`.
    fn on_failed(&self, reason: &str);
}

/// How a polling run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The payment completed.
    Completed(Payment),
    /// The payment failed.
    Failed {
        /// Final record.
        payment: Payment,
        /// Why.
        reason: String,
    },
    /// The retry bound ran out; the payment was reset to pending.
    TimedOut,
    /// A non-transient error ended the run.
    Aborted(PaymentError),
    /// The run was stopped or replaced.
    Stopped,
}

/// Errors starting a run.
#[derive(Debug, Error)]
pub enum PollerError {
    /// The stored payment has already reached a terminal status.
    #[error("cannot poll a finished payment")]
    Finished(#[from] StatusTransitionError),
}

/// Polls one payment at a time and writes what it learns to the payment
/// store.
pub struct PaymentPoller {
    api: Arc<dyn PaymentsApi>,
    store: Shared<PaymentStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
    generation: Arc<AtomicU64>,
    task: Option<JoinHandle<PollOutcome>>,
}

impl fmt::Debug for PaymentPoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentPoller")
            .field("config", &self.config)
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .field("running", &self.is_polling())
            .finish_non_exhaustive()
    }
}

impl PaymentPoller {
    /// A poller that isn't running yet.
    pub fn new(
        api: Arc<dyn PaymentsApi>,
        store: Shared<PaymentStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: PollerConfig,
    ) -> Self {
        Self {
            api,
            store,
            notifier,
            clock,
            config,
            generation: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// Whether a run is in progress.
    pub fn is_polling(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Start polling `payment_id`. The store's payment moves to processing
    /// straight away. Returns `false` if a run is already in progress.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`PollerError::Finished`] if the stored payment is already
    /// completed or failed.
    pub fn start_polling(&mut self, payment_id: PaymentUuid, handler: Arc<dyn PollHandler>) -> Result<bool, PollerError> {
        if self.is_polling() {
            debug!(%payment_id, "already polling");

            return Ok(false);
        }

        let now = self.clock.now();
        let method = self.store.with(|store| -> Result<Option<PaymentMethod>, StatusTransitionError> {
            store.set_status(PaymentStatus::Processing, now)?;
            store.set_polling(true);

            Ok(store.payment().map(|payment| payment.method))
        })?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let run = PollRun {
            payment_id,
            method: method.unwrap_or(PaymentMethod::QrTransfer),
            generation,
            current: Arc::clone(&self.generation),
            api: Arc::clone(&self.api),
            store: self.store.clone(),
            notifier: Arc::clone(&self.notifier),
            clock: Arc::clone(&self.clock),
            handler,
            config: self.config,
        };

        info!(%payment_id, generation, interval = ?self.config.interval, "polling started");

        self.task = Some(tokio::spawn(run.run()));

        Ok(true)
    }

    /// Stop the current run, if any. Responses still in flight are ignored.
    pub fn stop_polling(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(task) = self.task.take() {
            task.abort();

            debug!("polling stopped");
        }

        self.store.with(|store| store.set_polling(false));
    }

    /// Wait for the current run to end.
    pub async fn join(&mut self) -> PollOutcome {
        let Some(task) = self.task.take() else {
            return PollOutcome::Stopped;
        };

        match task.await {
            Ok(outcome) => outcome,
            Err(join_error) if join_error.is_cancelled() => PollOutcome::Stopped,
            Err(join_error) => {
                error!(error = %join_error, "polling task failed");

                let failure = classify(&ProviderFailure::Network {
                    context: "status check".to_string(),
                });

                self.store.with(|store| store.set_error(Some(failure.message.clone())));

                PollOutcome::Aborted(failure)
            }
        }
    }
}

impl Drop for PaymentPoller {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

/// One polling run, owned by its task.
struct PollRun {
    payment_id: PaymentUuid,
    method: PaymentMethod,
    generation: u64,
    current: Arc<AtomicU64>,
    api: Arc<dyn PaymentsApi>,
    store: Shared<PaymentStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    handler: Arc<dyn PollHandler>,
    config: PollerConfig,
}

enum Tick {
    /// The backend answered and the payment is still open.
    Pending,
    /// The check itself failed transiently; doesn't count toward the bound.
    Retry,
    Done(PollOutcome),
}

impl PollRun {
    async fn run(self) -> PollOutcome {
        let mut interval = time::interval_at(Instant::now() + self.config.interval, self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut retries = 0_u32;

        loop {
            interval.tick().await;

            if !self.is_current() {
                return PollOutcome::Stopped;
            }

            let response = self.api.get_payment(self.payment_id).await;
            let tick = match response {
                Ok(payment) => self.apply(payment),
                Err(api_error) => self.apply_error(&api_error),
            };

            match tick {
                Some(Tick::Done(outcome)) => return outcome,
                Some(Tick::Pending) => {}
                Some(Tick::Retry) => continue,
                None => {
                    debug!(payment_id = %self.payment_id, generation = self.generation, "stale response dropped");

                    return PollOutcome::Stopped;
                }
            }

            retries += 1;

            debug!(payment_id = %self.payment_id, attempt = retries, max = self.config.max_retries, "payment still pending");

            if retries >= self.config.max_retries {
                return self.time_out();
            }
        }
    }

    fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    /// Apply a fetched payment. `None` means the run went stale.
    fn apply(&self, payment: Payment) -> Option<Tick> {
        let now = self.clock.now();
        let status = payment.status;

        let applied = self.store.with(|store| {
            if !self.is_current() {
                return None;
            }

            if let Err(rejected) = store.set_status(status, now) {
                warn!(payment_id = %self.payment_id, error = %rejected, "ignoring status regression");

                return Some(false);
            }

            match status {
                PaymentStatus::Completed => {
                    store.set_error(None);
                    store.set_payment(payment.clone());
                }
                PaymentStatus::Failed => {
                    let reason = failure_reason(&payment);

                    store.set_error(Some(reason));
                    store.set_payment(payment.clone());
                }
                PaymentStatus::Pending | PaymentStatus::Processing => {}
            }

            Some(true)
        })?;

        if !applied {
            return Some(Tick::Pending);
        }

        match status {
            PaymentStatus::Completed => {
                info!(payment_id = %self.payment_id, "payment completed");

                self.handler.on_complete(&payment);

                Some(Tick::Done(PollOutcome::Completed(payment)))
            }
            PaymentStatus::Failed => {
                let reason = failure_reason(&payment);

                warn!(payment_id = %self.payment_id, %reason, "payment failed");

                self.handler.on_failed(&reason);
                self.notifier.notify(Notification::new(
                    "Payment Failed",
                    reason.clone(),
                    Severity::Destructive,
                ));

                Some(Tick::Done(PollOutcome::Failed { payment, reason }))
            }
            PaymentStatus::Pending | PaymentStatus::Processing => Some(Tick::Pending),
        }
    }

    /// Apply a failed fetch. `None` means the run went stale.
    fn apply_error(&self, api_error: &ApiError) -> Option<Tick> {
        if api_error.is_transient() {
            warn!(payment_id = %self.payment_id, error = %api_error, "status check failed, retrying");

            return self.store.with(|store| {
                self.is_current().then(|| {
                    store.note_transient_error(TRANSIENT_ERROR_MESSAGE);

                    Tick::Retry
                })
            });
        }

        let classified = classify(&api_error.provider_failure(self.method, "status check"));

        error!(payment_id = %self.payment_id, error = %api_error, code = %classified.code, "status check failed");

        self.store.with(|store| {
            self.is_current().then(|| store.set_error(Some(classified.message.clone())))
        })?;

        self.notifier.notify(Notification::new(
            "Payment Error",
            classified.message.clone(),
            Severity::Destructive,
        ));

        Some(Tick::Done(PollOutcome::Aborted(classified)))
    }

    fn time_out(&self) -> PollOutcome {
        let now = self.clock.now();

        let current = self.store.with(|store| {
            self.is_current().then(|| {
                store.reset_status_after_timeout(now);
                store.set_error(Some(TIMEOUT_MESSAGE.to_string()));
            })
        });

        if current.is_none() {
            return PollOutcome::Stopped;
        }

        warn!(payment_id = %self.payment_id, max = self.config.max_retries, "payment confirmation timed out");

        self.notifier.notify(Notification::new(
            "Processing Timeout",
            "Payment is still being processed. You will receive an email confirmation.",
            Severity::Info,
        ));

        PollOutcome::TimedOut
    }
}

fn failure_reason(payment: &Payment) -> String {
    payment
        .failure_reason
        .clone()
        .filter(|reason| !reason.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string())
}
