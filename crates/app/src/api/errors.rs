//! API errors

use brew::payments::{errors::ProviderFailure, models::PaymentMethod};
use reqwest::StatusCode;
use thiserror::Error;

/// Errors from the backend API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never got a response.
    #[error("request to {url} failed")]
    Network {
        /// Requested URL.
        url: String,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The backend answered with a non-2xx status.
    #[error("{url} responded with {status}: {message}")]
    Status {
        /// Requested URL.
        url: String,
        /// Response status.
        status: StatusCode,
        /// The body's `message`, or the status reason.
        message: String,
        /// The body's provider error `code`, if any.
        code: Option<String>,
        /// The body's provider error `type`, if any.
        kind: Option<String>,
    },

    /// The response body wasn't what we expected.
    #[error("could not decode response from {url}")]
    Decode {
        /// Requested URL.
        url: String,
        /// Decoder error.
        #[source]
        source: reqwest::Error,
    },

    /// The backend wants a signed-in customer.
    #[error("not signed in")]
    Unauthenticated,
}

impl ApiError {
    /// Whether the same request might succeed if sent again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Status { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Decode { .. } | Self::Unauthenticated => false,
        }
    }

    /// Response status, when there was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Unauthenticated => Some(StatusCode::UNAUTHORIZED),
            Self::Network { .. } | Self::Decode { .. } => None,
        }
    }

    /// Describe this error to the classifier. `method` says which provider
    /// was involved; `context` names what was being attempted.
    pub fn provider_failure(&self, method: PaymentMethod, context: &str) -> ProviderFailure {
        match self {
            Self::Network { .. } => ProviderFailure::Network {
                context: context.to_string(),
            },
            Self::Unauthenticated => ProviderFailure::SessionExpired,
            Self::Status { status, .. } if *status == StatusCode::CONFLICT => ProviderFailure::Duplicate,
            Self::Status { status, .. } if *status == StatusCode::GONE => ProviderFailure::SessionExpired,
            Self::Status { code, kind, .. } => match method {
                PaymentMethod::Card => ProviderFailure::Card {
                    kind: kind.clone().unwrap_or_else(|| "api_error".to_string()),
                    code: code.clone(),
                },
                PaymentMethod::QrTransfer => ProviderFailure::QrRail { code: code.clone() },
            },
            Self::Decode { .. } => match method {
                PaymentMethod::Card => ProviderFailure::Card {
                    kind: "api_error".to_string(),
                    code: None,
                },
                PaymentMethod::QrTransfer => ProviderFailure::QrRail { code: None },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use brew::payments::errors::{ErrorCode, classify};

    use super::*;

    fn status(status: StatusCode, code: Option<&str>, kind: Option<&str>) -> ApiError {
        ApiError::Status {
            url: "http://localhost/api/v1/payments".to_string(),
            status,
            message: "failed".to_string(),
            code: code.map(str::to_string),
            kind: kind.map(str::to_string),
        }
    }

    #[test]
    fn server_errors_and_rate_limits_are_transient() {
        assert!(status(StatusCode::BAD_GATEWAY, None, None).is_transient());
        assert!(status(StatusCode::TOO_MANY_REQUESTS, None, None).is_transient());
        assert!(!status(StatusCode::NOT_FOUND, None, None).is_transient());
        assert!(!ApiError::Unauthenticated.is_transient());
    }

    #[test]
    fn card_declines_reach_the_classifier() {
        let failure = status(
            StatusCode::PAYMENT_REQUIRED,
            Some("expired_card"),
            Some("card_error"),
        )
        .provider_failure(PaymentMethod::Card, "payment");

        let error = classify(&failure);

        assert_eq!(error.code, ErrorCode::CardDeclined);
        assert_eq!(error.message, "Your card has expired. Please use a different card.");
    }

    #[test]
    fn conflicts_are_duplicates() {
        let failure = status(StatusCode::CONFLICT, None, None)
            .provider_failure(PaymentMethod::QrTransfer, "payment");

        assert_eq!(failure, ProviderFailure::Duplicate);
    }

    #[test]
    fn qr_rail_codes_pass_through() {
        let failure = status(StatusCode::BAD_GATEWAY, Some("QR_GENERATION_FAILED"), None)
            .provider_failure(PaymentMethod::QrTransfer, "payment");

        assert_eq!(classify(&failure).code, ErrorCode::QrGenerationFailed);
    }
}
