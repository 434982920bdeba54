//! Shared home for a brought-up charger.
//!
//! Platform glue that has to reach the charger from several entry points (interrupt shims,
//! property handlers, the service loop) installs it once and then borrows it per call.
//! The slot is an async mutex: the critical section only covers the lock handover, never the
//! register traffic or the blocking sleeps inside a borrow.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;

use crate::error::Error;

/// Holds at most one charger. Usable as a `static` when `C: Send`.
pub struct ChargerSlot<C> {
    inner: Mutex<CriticalSectionRawMutex, Option<C>>,
}

impl<C> ChargerSlot<C> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Store `charger`, returning the one it replaces.
    pub async fn install(&self, charger: C) -> Option<C> {
        self.inner.lock().await.replace(charger)
    }

    /// Remove the charger, e.g. to shut it down.
    pub async fn take(&self) -> Option<C> {
        self.inner.lock().await.take()
    }

    pub async fn is_installed(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    /// Run `f` against the installed charger, waiting for any other borrower to finish.
    ///
    /// Returns [`Error::NotInitialized`] when the slot is empty. `f` must not re-enter the slot.
    pub async fn with<R, E>(&self, f: impl FnOnce(&mut C) -> Result<R, Error<E>>) -> Result<R, Error<E>> {
        let mut guard = self.inner.lock().await;
        match guard.as_mut() {
            Some(charger) => f(charger),
            None => Err(Error::NotInitialized),
        }
    }

    /// Non-waiting [`with`](Self::with) for interrupt shims and other synchronous callers.
    ///
    /// Returns `None` while another borrower holds the charger.
    pub fn try_with<R, E>(&self, f: impl FnOnce(&mut C) -> Result<R, Error<E>>) -> Option<Result<R, Error<E>>> {
        let mut guard = self.inner.try_lock().ok()?;
        Some(match guard.as_mut() {
            Some(charger) => f(charger),
            None => Err(Error::NotInitialized),
        })
    }
}

impl<C> Default for ChargerSlot<C> {
    fn default() -> Self {
        Self::new()
    }
}
