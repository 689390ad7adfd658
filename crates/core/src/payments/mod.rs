//! Payments
//!
//! The payment record and its status rules, the store holding the session's
//! active payment, the error classifier, and the checkout state machine.

pub mod errors;
pub mod flow;
pub mod models;
pub mod store;
