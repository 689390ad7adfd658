//! Bearer token storage

use std::fmt;

use brew::persistence::{AUTH_TOKEN_KEY, Persistence, PersistenceError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, warn};
use zeroize::Zeroize;

/// A bearer token issued at login. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken {
    value: String,
}

impl BearerToken {
    /// Wrap a token.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// The raw token, for the `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(**redacted**)")
    }
}

impl Drop for BearerToken {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

impl Serialize for BearerToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de> Deserialize<'de> for BearerToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// The signed-in customer's token, kept until logout.
#[derive(Debug, Clone)]
pub struct AuthSession {
    persistence: Persistence,
}

impl AuthSession {
    /// A session backed by `persistence`.
    pub fn new(persistence: Persistence) -> Self {
        Self { persistence }
    }

    /// The stored token. Storage failures read as signed out.
    pub fn token(&self) -> Option<BearerToken> {
        match self.persistence.get::<BearerToken>(AUTH_TOKEN_KEY) {
            Ok(token) => token,
            Err(error) => {
                warn!(%error, "could not read auth token");

                None
            }
        }
    }

    /// Whether a token is stored.
    pub fn is_signed_in(&self) -> bool {
        self.token().is_some()
    }

    /// Keep `token` until [`AuthSession::clear`].
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if the write fails.
    pub fn store(&self, token: &BearerToken) -> Result<(), PersistenceError> {
        self.persistence.set_indefinitely(AUTH_TOKEN_KEY, token)?;

        debug!("auth token stored");

        Ok(())
    }

    /// Forget the token.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if the delete fails.
    pub fn clear(&self) -> Result<(), PersistenceError> {
        self.persistence.remove(AUTH_TOKEN_KEY)?;

        debug!("auth token cleared");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use brew::{clock::SystemClock, persistence::MemoryStore};
    use testresult::TestResult;

    use super::*;

    fn session() -> AuthSession {
        AuthSession::new(Persistence::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
        ))
    }

    #[test]
    fn stores_and_clears_the_token() -> TestResult {
        let session = session();

        assert!(!session.is_signed_in());

        session.store(&BearerToken::new("1|abcdef"))?;

        assert_eq!(session.token().as_ref().map(BearerToken::expose), Some("1|abcdef"));

        session.clear()?;

        assert!(session.token().is_none());

        Ok(())
    }

    #[test]
    fn tokens_are_redacted() {
        assert_eq!(
            format!("{:?}", BearerToken::new("1|abcdef")),
            "BearerToken(**redacted**)"
        );
    }
}
