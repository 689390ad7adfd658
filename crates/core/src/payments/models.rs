//! Payment records

use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

use crate::{decimal::Amount, orders::OrderUuid, uuids::TypedUuid};

/// Payment UUID.
pub type PaymentUuid = TypedUuid<Payment>;

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// Scan a QR code from a banking app and push the funds.
    #[serde(rename = "paynow")]
    QrTransfer,

    /// Enter card details into the processor's hosted form.
    #[serde(rename = "stripe_card")]
    Card,
}

impl PaymentMethod {
    /// Both methods, in the order they are offered.
    pub const ALL: [Self; 2] = [Self::QrTransfer, Self::Card];

    /// Path segment used by the payment endpoints.
    pub const fn endpoint_segment(self) -> &'static str {
        match self {
            Self::QrTransfer => "paynow",
            Self::Card => "stripe",
        }
    }

    /// Name shown to customers.
    pub const fn label(self) -> &'static str {
        match self {
            Self::QrTransfer => "PayNow QR",
            Self::Card => "Card",
        }
    }

    /// The other method.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::QrTransfer => Self::Card,
            Self::Card => Self::QrTransfer,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint_segment())
    }
}

/// Where a payment is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Created, nothing received yet.
    Pending,
    /// The provider is working on it.
    Processing,
    /// Funds received.
    Completed,
    /// The provider gave up.
    Failed,
}

impl PaymentStatus {
    /// Completed and failed payments never change again.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal forward step. Staying
    /// put is always allowed.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, _)
                | (Self::Processing, Self::Processing | Self::Completed | Self::Failed)
                | (Self::Completed, Self::Completed)
                | (Self::Failed, Self::Failed)
        )
    }

    /// Lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status update that would move a payment backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("payment cannot move from {from} to {to}")]
pub struct StatusTransitionError {
    /// Current status.
    pub from: PaymentStatus,
    /// Rejected status.
    pub to: PaymentStatus,
}

/// A payment attempt for an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Payment identifier.
    pub id: PaymentUuid,

    /// Owning order.
    pub order_id: OrderUuid,

    /// Payment method.
    #[serde(rename = "payment_method")]
    pub method: PaymentMethod,

    /// Lifecycle status.
    pub status: PaymentStatus,

    /// Amount charged.
    pub amount: Amount,

    /// QR payload for transfer payments.
    #[serde(default)]
    pub paynow_qr_data: Option<String>,

    /// The card processor's reference for this payment.
    #[serde(default, alias = "stripe_payment_intent_id")]
    pub provider_payment_id: Option<String>,

    /// Why the provider failed the payment.
    #[serde(default)]
    pub failure_reason: Option<String>,

    /// Creation time.
    pub created_at: Timestamp,

    /// Last update time.
    pub updated_at: Timestamp,
}

impl Payment {
    /// Move to `status` at `at`. Returns whether the status changed.
    ///
    /// # Errors
    ///
    /// Returns a [`StatusTransitionError`] for backward moves, including any
    /// move out of a terminal status.
    pub fn advance(&mut self, status: PaymentStatus, at: Timestamp) -> Result<bool, StatusTransitionError> {
        if !self.status.can_transition_to(status) {
            return Err(StatusTransitionError {
                from: self.status,
                to: status,
            });
        }

        if self.status == status {
            return Ok(false);
        }

        self.status = status;
        self.updated_at = at;

        Ok(true)
    }

    /// Put a payment whose confirmation timed out back to pending so the
    /// customer can check again. Only processing payments are reset.
    pub fn reset_after_timeout(&mut self, at: Timestamp) -> bool {
        if self.status != PaymentStatus::Processing {
            return false;
        }

        self.status = PaymentStatus::Pending;
        self.updated_at = at;

        true
    }

    /// Whether the payment can be picked up again after a reload.
    pub const fn is_resumable(&self) -> bool {
        matches!(self.status, PaymentStatus::Pending | PaymentStatus::Processing)
    }
}

/// Short-lived secret the card form needs to confirm a payment. Never
/// persisted and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSecret {
    value: String,
}

impl ClientSecret {
    /// Wrap a secret.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// The raw secret, for handing to the card form.
    pub fn expose(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClientSecret(**redacted**)")
    }
}

impl Drop for ClientSecret {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

impl<'de> Deserialize<'de> for ClientSecret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}
