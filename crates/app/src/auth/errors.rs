//! Auth errors

use brew::persistence::PersistenceError;
use thiserror::Error;

use crate::{api::ApiError, auth::models::ValidationError};

/// Errors from signing in and out.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The form was rejected before sending.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The backend call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The token could not be stored or cleared.
    #[error("could not update the auth session")]
    Session(#[from] PersistenceError),
}
