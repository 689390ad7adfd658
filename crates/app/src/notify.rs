//! Customer notifications

use brew::payments::errors::{PaymentError, RetryDecision};
use mockall::automock;
use tracing::{error, info, warn};

/// How loudly to show a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Neutral.
    Info,
    /// Something worked.
    Success,
    /// Something needs attention.
    Warning,
    /// Something failed.
    Destructive,
}

/// A short message for the customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Headline.
    pub title: String,
    /// Body.
    pub description: String,
    /// Severity.
    pub severity: Severity,
}

impl Notification {
    /// A notification with the given parts.
    pub fn new(title: impl Into<String>, description: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity,
        }
    }

    /// The standard notice for a classified payment error.
    pub fn payment_error(error: &PaymentError) -> Self {
        Self::new("Payment Error", error.message.clone(), Severity::Warning)
    }

    /// The notice shown when a retry is attempted or refused.
    pub fn retry(decision: RetryDecision, context: &str) -> Self {
        let severity = match decision {
            RetryDecision::Retry { .. } => Severity::Info,
            RetryDecision::Exhausted => Severity::Warning,
        };

        Self::new(decision.title(), decision.description(context), severity)
    }
}

/// Somewhere to show notifications.
#[automock]
pub trait Notifier: Send + Sync {
    /// Show `notification`.
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        let Notification {
            title,
            description,
            severity,
        } = notification;

        match severity {
            Severity::Info | Severity::Success => info!(?severity, %title, %description, "notification"),
            Severity::Warning => warn!(?severity, %title, %description, "notification"),
            Severity::Destructive => error!(?severity, %title, %description, "notification"),
        }
    }
}
