//! Payment error classification
//!
//! Raw failures from the card processor, the QR rail and the network are
//! turned into a [`PaymentError`]: a stable code, a message a customer can
//! act on, and the next step to offer. Provider codes never reach the
//! message.

use std::{fmt, time::Duration};

use thiserror::Error;
use tracing::debug;

use crate::payments::{flow::Destination, models::PaymentMethod};

/// Retries allowed per payment attempt.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Delay before retrying after the processor rate-limits us.
pub const RATE_LIMIT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Delay before retrying after a network failure.
pub const NETWORK_RETRY_DELAY: Duration = Duration::from_secs(1);

const DEFAULT_DECLINE_MESSAGE: &str =
    "Your card was declined. Please try another card or contact your bank.";

/// Broad kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A form check failed before anything was sent.
    Validation,
    /// A method, or the whole payment service, is down.
    Availability,
    /// The provider refused the payment.
    ProviderDeclined,
    /// The provider failed in a way worth retrying.
    ProviderTransient,
    /// The QR code ran out of time.
    Expiry,
    /// The request never got a response.
    Network,
    /// Confirmation didn't arrive in time.
    Timeout,
    /// The payment session is stale.
    Session,
    /// The payment was already made or is underway.
    Duplicate,
}

/// Stable identifier for a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The card was declined.
    CardDeclined,
    /// The processor is rate-limiting us.
    RateLimit,
    /// The processor rejected the request as malformed.
    InvalidRequest,
    /// Any other processor failure.
    ProcessorError,
    /// The QR rail couldn't produce a code.
    QrGenerationFailed,
    /// The QR code expired.
    QrExpired,
    /// Any other QR rail failure.
    QrTransferError,
    /// No response from the server.
    NetworkError,
    /// The payment session expired.
    SessionExpired,
    /// The payment was already made or is underway.
    DuplicatePayment,
    /// Confirmation is taking too long.
    PaymentTimeout,
    /// One method is down.
    MethodUnavailable,
    /// Both methods are down.
    PaymentsOffline,
    /// The card form can't be shown without a publishable key.
    CardUnconfigured,
}

impl ErrorCode {
    /// Snake-case name, as logged.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CardDeclined => "card_declined",
            Self::RateLimit => "rate_limit",
            Self::InvalidRequest => "invalid_request",
            Self::ProcessorError => "processor_error",
            Self::QrGenerationFailed => "qr_generation_failed",
            Self::QrExpired => "qr_expired",
            Self::QrTransferError => "qr_transfer_error",
            Self::NetworkError => "network_error",
            Self::SessionExpired => "session_expired",
            Self::DuplicatePayment => "duplicate_payment",
            Self::PaymentTimeout => "payment_timeout",
            Self::MethodUnavailable => "method_unavailable",
            Self::PaymentsOffline => "payments_offline",
            Self::CardUnconfigured => "card_unconfigured",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure as reported by its source, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderFailure {
    /// The card processor returned an error object.
    Card {
        /// The processor's error `type`, e.g. `card_error`.
        kind: String,
        /// The processor's error `code`, e.g. `insufficient_funds`.
        code: Option<String>,
    },

    /// The QR rail returned an error.
    QrRail {
        /// The rail's error code, e.g. `QR_EXPIRED`.
        code: Option<String>,
    },

    /// A request got no response.
    Network {
        /// What was being attempted, e.g. `initialization`.
        context: String,
    },

    /// The session behind the payment is gone.
    SessionExpired,

    /// The payment was already made or is underway.
    Duplicate,

    /// Status polling gave up before a terminal status.
    Timeout {
        /// Method being confirmed.
        method: PaymentMethod,
    },

    /// A method failed its availability check.
    MethodUnavailable(PaymentMethod),

    /// Both methods failed their availability checks.
    Offline,

    /// The card method was chosen without a publishable key configured.
    CardUnconfigured,
}

/// What to offer the customer next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Try the same thing again, optionally after a pause.
    Retry {
        /// Method to retry with; `None` retries whatever was in progress.
        method: Option<PaymentMethod>,
        /// Pause before retrying.
        after: Duration,
    },
    /// Ask the QR rail for a new code.
    RegenerateQr,
    /// Start the checkout page over.
    Reload,
    /// Ask the backend for the current status.
    CheckStatus,
    /// Pay with another method.
    SwitchMethod(PaymentMethod),
    /// Leave the checkout.
    Navigate(Destination),
}

impl RecoveryAction {
    /// Whether taking this action spends from the retry budget.
    pub const fn consumes_retry(self) -> bool {
        matches!(self, Self::Retry { .. } | Self::RegenerateQr)
    }
}

/// A classified failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PaymentError {
    /// Stable identifier.
    pub code: ErrorCode,

    /// Broad kind.
    pub category: ErrorCategory,

    /// What the customer sees.
    pub message: String,

    /// Whether the customer can continue from here.
    pub recoverable: bool,

    /// The next step to offer.
    pub action: Option<RecoveryAction>,
}

impl PaymentError {
    fn new(
        code: ErrorCode,
        category: ErrorCategory,
        message: impl Into<String>,
        action: RecoveryAction,
    ) -> Self {
        Self {
            code,
            category,
            message: message.into(),
            recoverable: true,
            action: Some(action),
        }
    }

    #[must_use]
    fn fatal(self) -> Self {
        Self {
            recoverable: false,
            ..self
        }
    }
}

/// Customer-facing text for a card decline reason.
pub fn decline_message(code: Option<&str>) -> &'static str {
    match code {
        Some("expired_card") => "Your card has expired. Please use a different card.",
        Some("insufficient_funds") => "Insufficient funds. Please use a different card or add funds.",
        Some("lost_card") => "This card was reported lost. Please use a different card.",
        Some("stolen_card") => "This card was reported stolen. Please use a different card.",
        Some("processing_error") => "An error occurred while processing your card. Please try again.",
        Some("incorrect_cvc") => "The CVC code is incorrect.",
        Some("pickup_card") => "Your card cannot be used for this transaction.",
        _ => DEFAULT_DECLINE_MESSAGE,
    }
}

/// Classify a raw failure.
pub fn classify(failure: &ProviderFailure) -> PaymentError {
    let error = match failure {
        ProviderFailure::Card { kind, code } => classify_card(kind, code.as_deref()),
        ProviderFailure::QrRail { code } => classify_qr(code.as_deref()),
        ProviderFailure::Network { .. } => PaymentError::new(
            ErrorCode::NetworkError,
            ErrorCategory::Network,
            "Network connection lost. Please check your internet and try again.",
            RecoveryAction::Retry {
                method: None,
                after: NETWORK_RETRY_DELAY,
            },
        ),
        ProviderFailure::SessionExpired => PaymentError::new(
            ErrorCode::SessionExpired,
            ErrorCategory::Session,
            "Your payment session has expired. Please create a new order.",
            RecoveryAction::Navigate(Destination::Catalog),
        )
        .fatal(),
        ProviderFailure::Duplicate => PaymentError::new(
            ErrorCode::DuplicatePayment,
            ErrorCategory::Duplicate,
            "This payment was already processed or is being processed.",
            RecoveryAction::Navigate(Destination::Orders),
        )
        .fatal(),
        ProviderFailure::Timeout { .. } => PaymentError::new(
            ErrorCode::PaymentTimeout,
            ErrorCategory::Timeout,
            "Payment confirmation is taking longer than expected. Please check your email for confirmation.",
            RecoveryAction::CheckStatus,
        ),
        ProviderFailure::MethodUnavailable(method) => PaymentError::new(
            ErrorCode::MethodUnavailable,
            ErrorCategory::Availability,
            match method {
                PaymentMethod::QrTransfer => "PayNow QR generation is temporarily unavailable",
                PaymentMethod::Card => "Card payment processing is temporarily unavailable",
            },
            RecoveryAction::SwitchMethod(method.other()),
        ),
        ProviderFailure::Offline => PaymentError::new(
            ErrorCode::PaymentsOffline,
            ErrorCategory::Availability,
            "Our payment system is temporarily offline. Please try again shortly.",
            RecoveryAction::Navigate(Destination::Cart),
        ),
        ProviderFailure::CardUnconfigured => PaymentError::new(
            ErrorCode::CardUnconfigured,
            ErrorCategory::Availability,
            "Unable to initialize card payment. Please try again or select a different payment method.",
            RecoveryAction::SwitchMethod(PaymentMethod::QrTransfer),
        ),
    };

    debug!(code = %error.code, ?failure, "classified payment failure");

    error
}

fn classify_card(kind: &str, code: Option<&str>) -> PaymentError {
    match kind {
        "card_error" | "card_declined" => PaymentError::new(
            ErrorCode::CardDeclined,
            ErrorCategory::ProviderDeclined,
            decline_message(code),
            RecoveryAction::Retry {
                method: Some(PaymentMethod::Card),
                after: Duration::ZERO,
            },
        ),
        "rate_limit_error" => PaymentError::new(
            ErrorCode::RateLimit,
            ErrorCategory::ProviderTransient,
            "Too many requests. Please wait a moment and try again.",
            RecoveryAction::Retry {
                method: Some(PaymentMethod::Card),
                after: RATE_LIMIT_RETRY_DELAY,
            },
        ),
        "invalid_request_error" => PaymentError::new(
            ErrorCode::InvalidRequest,
            ErrorCategory::ProviderDeclined,
            "Invalid payment details. Please check and try again.",
            RecoveryAction::Retry {
                method: None,
                after: Duration::ZERO,
            },
        ),
        _ => PaymentError::new(
            ErrorCode::ProcessorError,
            ErrorCategory::ProviderTransient,
            "An error occurred with our payment processor. Please try again.",
            RecoveryAction::Retry {
                method: None,
                after: Duration::ZERO,
            },
        ),
    }
}

fn classify_qr(code: Option<&str>) -> PaymentError {
    match code {
        Some("QR_GENERATION_FAILED") => PaymentError::new(
            ErrorCode::QrGenerationFailed,
            ErrorCategory::ProviderTransient,
            "Failed to generate PayNow QR code. Please refresh the page.",
            RecoveryAction::Reload,
        ),
        Some("QR_EXPIRED") => PaymentError::new(
            ErrorCode::QrExpired,
            ErrorCategory::Expiry,
            "Your QR code has expired. A new one has been generated.",
            RecoveryAction::RegenerateQr,
        ),
        _ => PaymentError::new(
            ErrorCode::QrTransferError,
            ErrorCategory::ProviderTransient,
            "An error occurred with PayNow. Please try again or use card payment.",
            RecoveryAction::Retry {
                method: Some(PaymentMethod::QrTransfer),
                after: Duration::ZERO,
            },
        ),
    }
}

/// Outcome of asking the retry budget for another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Go ahead; this is attempt `attempt` of `max`.
    Retry {
        /// This attempt's number, from one.
        attempt: u32,
        /// Attempts allowed.
        max: u32,
    },
    /// No attempts left; point the customer at support.
    Exhausted,
}

impl RetryDecision {
    /// Toast title for the decision.
    pub const fn title(self) -> &'static str {
        match self {
            Self::Retry { .. } => "Retrying...",
            Self::Exhausted => "Max Retries Reached",
        }
    }

    /// Toast body for the decision.
    pub fn description(self, context: &str) -> String {
        match self {
            Self::Retry { attempt, max } => format!("Retrying {context} (Attempt {attempt}/{max})"),
            Self::Exhausted => "Please contact support for assistance.".to_string(),
        }
    }
}

/// Retries spent on one payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    attempts: u32,
    max: u32,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(MAX_RETRY_ATTEMPTS)
    }
}

impl RetryBudget {
    /// A fresh budget of `max` attempts.
    pub const fn new(max: u32) -> Self {
        Self { attempts: 0, max }
    }

    /// Spend one attempt. The attempt that reaches the cap is refused.
    pub fn try_consume(&mut self) -> RetryDecision {
        self.attempts = self.attempts.saturating_add(1);

        if self.attempts >= self.max {
            return RetryDecision::Exhausted;
        }

        RetryDecision::Retry {
            attempt: self.attempts,
            max: self.max,
        }
    }

    /// Whether another attempt would be allowed.
    pub const fn can_retry(&self) -> bool {
        self.attempts.saturating_add(1) < self.max
    }

    /// Attempts spent so far.
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(kind: &str, code: Option<&str>) -> PaymentError {
        classify(&ProviderFailure::Card {
            kind: kind.to_string(),
            code: code.map(str::to_string),
        })
    }

    fn qr(code: &str) -> PaymentError {
        classify(&ProviderFailure::QrRail {
            code: Some(code.to_string()),
        })
    }

    #[test]
    fn declines_use_the_lookup_table() {
        let error = card("card_error", Some("insufficient_funds"));

        assert_eq!(error.code, ErrorCode::CardDeclined);
        assert_eq!(error.category, ErrorCategory::ProviderDeclined);
        assert_eq!(
            error.message,
            "Insufficient funds. Please use a different card or add funds."
        );
        assert!(error.recoverable);
    }

    #[test]
    fn unknown_decline_reasons_fall_back() {
        assert_eq!(card("card_declined", Some("do_not_honor")).message, DEFAULT_DECLINE_MESSAGE);
        assert_eq!(card("card_declined", None).message, DEFAULT_DECLINE_MESSAGE);
    }

    #[test]
    fn rate_limits_retry_after_a_pause() {
        let error = card("rate_limit_error", None);

        assert_eq!(error.code, ErrorCode::RateLimit);
        assert_eq!(
            error.action,
            Some(RecoveryAction::Retry {
                method: Some(PaymentMethod::Card),
                after: RATE_LIMIT_RETRY_DELAY,
            })
        );
    }

    #[test]
    fn unknown_processor_errors_are_generic() {
        let error = card("api_error", Some("secret_internal_code"));

        assert_eq!(error.code, ErrorCode::ProcessorError);
        assert!(!error.message.contains("secret_internal_code"));
    }

    #[test]
    fn expired_qr_codes_are_regenerated() {
        let error = qr("QR_EXPIRED");

        assert_eq!(error.category, ErrorCategory::Expiry);
        assert_eq!(error.action, Some(RecoveryAction::RegenerateQr));
    }

    #[test]
    fn failed_qr_generation_reloads() {
        assert_eq!(qr("QR_GENERATION_FAILED").action, Some(RecoveryAction::Reload));
        assert_eq!(qr("BANK_DOWN").code, ErrorCode::QrTransferError);
    }

    #[test]
    fn session_and_duplicate_errors_leave_the_flow() {
        let session = classify(&ProviderFailure::SessionExpired);
        let duplicate = classify(&ProviderFailure::Duplicate);

        assert!(!session.recoverable);
        assert_eq!(session.action, Some(RecoveryAction::Navigate(Destination::Catalog)));
        assert!(!duplicate.recoverable);
        assert_eq!(duplicate.action, Some(RecoveryAction::Navigate(Destination::Orders)));
    }

    #[test]
    fn unavailable_methods_offer_the_other_one() {
        let error = classify(&ProviderFailure::MethodUnavailable(PaymentMethod::Card));

        assert_eq!(error.category, ErrorCategory::Availability);
        assert_eq!(
            error.action,
            Some(RecoveryAction::SwitchMethod(PaymentMethod::QrTransfer))
        );
    }

    #[test]
    fn timeouts_offer_a_status_check() {
        let error = classify(&ProviderFailure::Timeout {
            method: PaymentMethod::QrTransfer,
        });

        assert_eq!(error.category, ErrorCategory::Timeout);
        assert_eq!(error.action, Some(RecoveryAction::CheckStatus));
        assert!(error.recoverable);
    }

    #[test]
    fn the_third_retry_is_refused() {
        let mut budget = RetryBudget::default();

        assert_eq!(budget.try_consume(), RetryDecision::Retry { attempt: 1, max: 3 });
        assert!(budget.can_retry());
        assert_eq!(budget.try_consume(), RetryDecision::Retry { attempt: 2, max: 3 });
        assert!(!budget.can_retry());
        assert_eq!(budget.try_consume(), RetryDecision::Exhausted);
        assert_eq!(budget.try_consume(), RetryDecision::Exhausted);
    }

    #[test]
    fn retry_toasts_count_attempts() {
        assert_eq!(
            RetryDecision::Retry { attempt: 2, max: 3 }.description("paynow"),
            "Retrying paynow (Attempt 2/3)"
        );
        assert_eq!(RetryDecision::Exhausted.title(), "Max Retries Reached");
    }
}
