//! Orders API

use async_trait::async_trait;
use brew::orders::{Order, OrderUuid};
use mockall::automock;
use reqwest::Method;

use crate::api::{client::ApiClient, errors::ApiError};

/// Order endpoints.
#[automock]
#[async_trait]
pub trait OrdersApi: Send + Sync {
    /// Fetch an order.
    async fn get_order(&self, order_id: OrderUuid) -> Result<Order, ApiError>;
}

/// [`OrdersApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpOrdersApi {
    client: ApiClient,
}

impl HttpOrdersApi {
    /// Orders API using `client`.
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OrdersApi for HttpOrdersApi {
    async fn get_order(&self, order_id: OrderUuid) -> Result<Order, ApiError> {
        let url = self.client.url(&format!("orders/{order_id}"));
        let request = self.client.request(Method::GET, &url);

        self.client.send_json(&url, request).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use brew::{
        clock::SystemClock,
        orders::OrderStatus,
        persistence::{MemoryStore, Persistence},
    };
    use reqwest::StatusCode;
    use serde_json::json;
    use testresult::TestResult;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use crate::auth::session::AuthSession;

    use super::*;

    const ORDER: &str = "01936f3c-0000-7000-8000-000000000001";

    fn api(server: &MockServer) -> HttpOrdersApi {
        let session = AuthSession::new(Persistence::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
        ));

        HttpOrdersApi::new(ApiClient::new(format!("{}/api/v1", server.uri()), session))
    }

    #[tokio::test]
    async fn fetches_an_order() -> TestResult {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/api/v1/orders/{ORDER}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": ORDER,
                "invoice_number": "MBC-20260101-0001",
                "customer_name": "Tan Ah Kow",
                "customer_phone": "+6591234567",
                "location_id": "01936f3c-0000-7000-8000-0000000000aa",
                "pickup_at": "2026-01-01T10:00:00Z",
                "status": "confirmed",
                "subtotal_cents": 620,
                "gst_cents": 56,
                "total_cents": 676,
                "items": [],
                "created_at": "2026-01-01T09:00:00Z",
                "updated_at": "2026-01-01T09:00:00Z",
            })))
            .mount(&server)
            .await;

        let order = api(&server).get_order(ORDER.parse()?).await?;

        assert_eq!(order.invoice_number, "MBC-20260101-0001");
        assert_eq!(order.status, OrderStatus::Confirmed);

        Ok(())
    }

    #[tokio::test]
    async fn missing_orders_are_status_errors() -> TestResult {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/api/v1/orders/{ORDER}")))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Order not found" })))
            .mount(&server)
            .await;

        let error = api(&server).get_order(ORDER.parse()?).await.err();

        assert_eq!(error.as_ref().and_then(ApiError::status), Some(StatusCode::NOT_FOUND));

        Ok(())
    }
}
