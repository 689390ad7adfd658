//! Brew prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    cart::{Cart, CartAction, CartActionKind, CartHistory, CartItem, HISTORY_LIMIT, PersistedCart},
    clock::{Clock, ManualClock, SystemClock},
    decimal::{Amount, AmountError, gst_rate},
    orders::{Order, OrderItem, OrderStatus, OrderUuid, ProductSnapshot},
    payments::{
        errors::{
            ErrorCategory, ErrorCode, MAX_RETRY_ATTEMPTS, PaymentError, ProviderFailure,
            RecoveryAction, RetryBudget, RetryDecision, classify, decline_message,
        },
        flow::{
            Availability, Confirmation, Destination, ErrorBranch, FlowState, FlowTransitionError,
            OnwardAction, PaymentFlow, Processing, QR_VALIDITY, QrSession,
        },
        models::{
            ClientSecret, Payment, PaymentMethod, PaymentStatus, PaymentUuid,
            StatusTransitionError,
        },
        store::{PaymentStore, PersistedPayment},
    },
    persistence::{
        FileStore, KeyValueStore, MemoryStore, Persistence, PersistenceError, StorageError,
        initialize_persistence,
    },
    uuids::TypedUuid,
};
