//! Backend API clients

pub use self::{
    client::ApiClient,
    errors::ApiError,
    orders::{HttpOrdersApi, MockOrdersApi, OrdersApi},
    payments::{CardPaymentCreated, HttpPaymentsApi, MockPaymentsApi, PaymentsApi, QrPaymentCreated},
};

mod client;
mod errors;
mod idempotency;
mod orders;
mod payments;
