//! Shared state

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A store shared between the controller, the poller and its task.
///
/// Guards are never held across an `.await`.
#[derive(Debug, Default)]
pub struct Shared<T>(Arc<Mutex<T>>);

impl<T> Shared<T> {
    /// Share `value`.
    pub fn new(value: T) -> Self {
        Self(Arc::new(Mutex::new(value)))
    }

    /// Lock the value. A panic while holding the lock doesn't poison it for
    /// everyone else.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with the value locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock())
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_value() {
        let shared = Shared::new(1_u32);
        let other = shared.clone();

        other.with(|value| *value += 1);

        assert_eq!(*shared.lock(), 2);
    }
}
