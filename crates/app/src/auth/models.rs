//! Auth models

use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::session::BearerToken;

/// Shortest accepted password.
pub const MIN_PASSWORD_LEN: usize = 8;

/// What a user may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Places orders.
    Customer,
    /// Runs the shop.
    Admin,
}

/// A storefront account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Account identifier.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Login email.
    pub email: String,
    /// Role.
    pub role: UserRole,
    /// When the email was verified.
    #[serde(default)]
    pub email_verified_at: Option<Timestamp>,
    /// Registration time.
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

impl User {
    /// Whether the account is an admin.
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Returned by login and register.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    /// The signed-in account.
    pub user: User,
    /// Token for later requests.
    pub token: BearerToken,
    /// Always `Bearer`.
    pub token_type: String,
}

/// Returned by token refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedToken {
    /// Replacement token.
    pub token: BearerToken,
    /// Always `Bearer`.
    pub token_type: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MeResponse {
    pub(crate) user: User,
}

/// Email and password.
#[derive(Clone, Serialize)]
pub struct LoginCredentials {
    /// Login email.
    pub email: String,
    /// Password.
    pub password: String,
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("email", &self.email)
            .field("password", &"**redacted**")
            .finish()
    }
}

/// A registration form.
#[derive(Clone, Serialize)]
pub struct RegisterData {
    /// Display name.
    pub name: String,
    /// Login email.
    pub email: String,
    /// Password.
    pub password: String,
    /// Password, typed again.
    pub password_confirmation: String,
}

impl fmt::Debug for RegisterData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterData")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"**redacted**")
            .finish_non_exhaustive()
    }
}

/// A registration form the backend would reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Name left blank.
    #[error("Name is required")]
    NameRequired,

    /// Not an email address.
    #[error("Please enter a valid email address")]
    InvalidEmail,

    /// Confirmation differs.
    #[error("Passwords do not match")]
    PasswordMismatch,

    /// Too short.
    #[error("Password must be at least 8 characters")]
    PasswordTooShort,
}

impl RegisterData {
    /// Check the form before sending it.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::NameRequired);
        }

        if !plausible_email(self.email.trim()) {
            return Err(ValidationError::InvalidEmail);
        }

        if self.password != self.password_confirmation {
            return Err(ValidationError::PasswordMismatch);
        }

        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::PasswordTooShort);
        }

        Ok(())
    }
}

fn plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}
