//! Authentication

pub use self::{
    errors::AuthError,
    models::{AuthResponse, LoginCredentials, RegisterData, User, UserRole, ValidationError},
    service::{AuthApi, HttpAuthApi, MockAuthApi},
    session::{AuthSession, BearerToken},
};

pub mod errors;
pub mod models;
pub mod service;
pub mod session;
