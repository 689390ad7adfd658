//! Storefront client for Morning Brew Collective: backend API clients,
//! payment status polling and the checkout controller.

pub mod api;
pub mod auth;
pub mod checkout;
pub mod config;
pub mod context;
pub mod notify;
pub mod observability;
pub mod shared;
