//! Process-wide session registry.
//!
//! Sessions are owned by the registry and referenced across the
//! boundary by opaque non-zero `i64` handles; zero denotes "no
//! session". Each entry carries its own lock, so calls against one
//! session serialize while distinct sessions run concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use opuslink_codec::{Error, Result};

pub(crate) struct Registry<T> {
    entries: Mutex<HashMap<i64, Arc<Mutex<T>>>>,
    next: AtomicI64,
}

impl<T> Registry<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next: AtomicI64::new(1),
        }
    }

    /// Registers a session and returns its handle.
    pub(crate) fn insert(&self, session: T) -> i64 {
        let handle = self.next.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().insert(handle, Arc::new(Mutex::new(session)));
        trace!("Registered session handle {}", handle);
        handle
    }

    /// Runs `f` against the live session behind `handle`, holding the
    /// session's own lock for the duration of the call. The table lock
    /// is released first so other sessions stay reachable meanwhile.
    pub(crate) fn with<R>(&self, handle: i64, f: impl FnOnce(&mut T) -> Result<R>) -> Result<R> {
        let entry = self.entries.lock().get(&handle).cloned();
        match entry {
            Some(session) => f(&mut session.lock()),
            None => Err(Error::SessionClosed),
        }
    }

    /// Unregisters the session. Zero and already-removed handles are
    /// no-ops. A call still in flight on another thread keeps the
    /// session alive until it returns; the native resources are
    /// released when the last reference drops.
    pub(crate) fn remove(&self, handle: i64) {
        if self.entries.lock().remove(&handle).is_some() {
            trace!("Removed session handle {}", handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_with() {
        let registry: Registry<i32> = Registry::new();
        let handle = registry.insert(7);
        assert!(handle > 0);

        let value = registry.with(handle, |v| Ok(*v)).unwrap();
        assert_eq!(value, 7);

        registry.with(handle, |v| {
            *v = 9;
            Ok(())
        })
        .unwrap();
        assert_eq!(registry.with(handle, |v| Ok(*v)).unwrap(), 9);
    }

    #[test]
    fn test_handles_are_unique() {
        let registry: Registry<i32> = Registry::new();
        let a = registry.insert(1);
        let b = registry.insert(2);
        assert_ne!(a, b);
        assert_eq!(registry.with(a, |v| Ok(*v)).unwrap(), 1);
        assert_eq!(registry.with(b, |v| Ok(*v)).unwrap(), 2);
    }

    #[test]
    fn test_zero_and_unknown_handles() {
        let registry: Registry<i32> = Registry::new();
        assert!(matches!(
            registry.with(0, |v| Ok(*v)),
            Err(Error::SessionClosed)
        ));
        assert!(matches!(
            registry.with(12345, |v| Ok(*v)),
            Err(Error::SessionClosed)
        ));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry: Registry<i32> = Registry::new();
        let handle = registry.insert(1);

        registry.remove(handle);
        registry.remove(handle);
        registry.remove(0);

        assert!(matches!(
            registry.with(handle, |v| Ok(*v)),
            Err(Error::SessionClosed)
        ));
    }
}
