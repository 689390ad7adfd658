//! Checkout
//!
//! The payment flow controller and the status poller it hands payments to.

pub use controller::{CardConfirmation, CheckoutDeps, ControllerError, PaymentFlowController};
pub use poller::{MockPollHandler, PaymentPoller, PollHandler, PollOutcome, PollerConfig, PollerError};

pub mod controller;
pub mod poller;
