//! Payments API

use std::sync::Arc;

use async_trait::async_trait;
use brew::{
    clock::Clock,
    decimal::Amount,
    orders::OrderUuid,
    payments::models::{ClientSecret, Payment, PaymentMethod, PaymentUuid},
};
use jiff::Timestamp;
use mockall::automock;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{
    client::ApiClient,
    errors::ApiError,
    idempotency::{IDEMPOTENCY_HEADER, idempotency_key},
};

/// A freshly created QR-transfer payment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QrPaymentCreated {
    /// New payment.
    pub payment_id: PaymentUuid,
    /// QR payload to render.
    pub qr_code_url: String,
    /// When the QR stops being accepted, if the provider says.
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
}

/// A freshly created card payment.
#[derive(Debug, Clone, Deserialize)]
pub struct CardPaymentCreated {
    /// New payment.
    pub payment_id: PaymentUuid,
    /// Secret the card form confirms with.
    #[serde(default)]
    pub client_secret: Option<ClientSecret>,
}

/// Payment endpoints.
#[automock]
#[async_trait]
pub trait PaymentsApi: Send + Sync {
    /// Create a QR-transfer payment for `order_id`.
    async fn create_qr_payment(&self, order_id: OrderUuid) -> Result<QrPaymentCreated, ApiError>;

    /// Create a card payment for `amount` against `order_id`.
    async fn create_card_payment(&self, order_id: OrderUuid, amount: Amount) -> Result<CardPaymentCreated, ApiError>;

    /// Fetch a payment.
    async fn get_payment(&self, payment_id: PaymentUuid) -> Result<Payment, ApiError>;

    /// Every payment made against `order_id`.
    async fn payments_for_order(&self, order_id: OrderUuid) -> Result<Vec<Payment>, ApiError>;

    /// Refund `amount` of a completed payment.
    async fn refund(&self, payment_id: PaymentUuid, amount: Amount, reason: &str) -> Result<(), ApiError>;

    /// Whether `method` is currently accepting payments.
    async fn method_available(&self, method: PaymentMethod) -> Result<bool, ApiError>;
}

#[derive(Debug, Serialize)]
struct CardPaymentRequest {
    amount: Amount,
}

#[derive(Debug, Serialize)]
struct RefundRequest<'a> {
    amount: Amount,
    reason: &'a str,
}

/// [`PaymentsApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPaymentsApi {
    client: ApiClient,
    clock: Arc<dyn Clock>,
}

impl HttpPaymentsApi {
    /// Payments API using `client`; `clock` stamps idempotency keys.
    #[must_use]
    pub fn new(client: ApiClient, clock: Arc<dyn Clock>) -> Self {
        Self { client, clock }
    }
}

#[async_trait]
impl PaymentsApi for HttpPaymentsApi {
    async fn create_qr_payment(&self, order_id: OrderUuid) -> Result<QrPaymentCreated, ApiError> {
        let url = self.client.url(&format!("payments/{order_id}/paynow"));
        let key = idempotency_key(order_id, PaymentMethod::QrTransfer, self.clock.now());
        let request = self
            .client
            .request(Method::POST, &url)
            .header(IDEMPOTENCY_HEADER, key);

        let created: QrPaymentCreated = self.client.send_json(&url, request).await?;

        info!(%order_id, payment_id = %created.payment_id, "qr payment created");

        Ok(created)
    }

    async fn create_card_payment(&self, order_id: OrderUuid, amount: Amount) -> Result<CardPaymentCreated, ApiError> {
        let url = self.client.url(&format!("payments/{order_id}/stripe"));
        let key = idempotency_key(order_id, PaymentMethod::Card, self.clock.now());
        let request = self
            .client
            .request(Method::POST, &url)
            .header(IDEMPOTENCY_HEADER, key)
            .json(&CardPaymentRequest { amount });

        let created: CardPaymentCreated = self.client.send_json(&url, request).await?;

        info!(%order_id, payment_id = %created.payment_id, %amount, "card payment created");

        Ok(created)
    }

    async fn get_payment(&self, payment_id: PaymentUuid) -> Result<Payment, ApiError> {
        let url = self.client.url(&format!("payments/{payment_id}"));
        let request = self.client.request(Method::GET, &url);

        self.client.send_json(&url, request).await
    }

    async fn payments_for_order(&self, order_id: OrderUuid) -> Result<Vec<Payment>, ApiError> {
        let url = self.client.url("payments");
        let request = self
            .client
            .request(Method::GET, &url)
            .query(&[("order_id", order_id.to_string())]);

        self.client.send_json(&url, request).await
    }

    async fn refund(&self, payment_id: PaymentUuid, amount: Amount, reason: &str) -> Result<(), ApiError> {
        let url = self.client.url(&format!("payments/{payment_id}/refund"));
        let request = self
            .client
            .request(Method::POST, &url)
            .json(&RefundRequest { amount, reason });

        self.client.send_empty(&url, request).await?;

        info!(%payment_id, %amount, "refund requested");

        Ok(())
    }

    async fn method_available(&self, method: PaymentMethod) -> Result<bool, ApiError> {
        let url = self
            .client
            .url(&format!("payments/methods/{}/available", method.endpoint_segment()));
        let request = self.client.request(Method::GET, &url);
        let available = self.client.probe(&url, request).await?;

        if !available {
            warn!(%method, "payment method unavailable");
        }

        Ok(available)
    }
}
