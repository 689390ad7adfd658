//! Brew
//!
//! Checkout core for the Morning Brew Collective storefront: exact money
//! arithmetic, the cart with its undo/redo log, expiring local persistence,
//! and the payment store and flow state machine that sequence a QR-transfer
//! or hosted-card payment through to confirmation.

pub mod cart;
pub mod clock;
pub mod decimal;
pub mod orders;
pub mod payments;
pub mod persistence;
pub mod prelude;
pub mod uuids;
