use std::sync::Arc;

use parking_lot::Mutex;

/// Exclusive-access handle for driving a component from one thread while
/// another reads it.
///
/// Mutation goes through [`with`](Shared::with); readers take owned copies
/// through [`snapshot`](Shared::snapshot) and never hold a live view.
#[derive(Debug, Default)]
pub struct Shared<T>(Arc<Mutex<T>>);

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(Mutex::new(value)))
    }

    /// Run `f` with exclusive access.
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.lock())
    }

    /// Build an owned value from the current state.
    #[inline]
    pub fn snapshot<R: 'static>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.0.lock())
    }
}
