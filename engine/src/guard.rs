//! Reentrancy guard.
//!
//! An in-progress flag taken at entry and released when the returned
//! token drops, on every exit path including unwinding.

use autosettle_common::{Result, SettleError};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    entered: AtomicBool,
}

/// Proof that the guard is held. Releases it on drop.
#[must_use = "the guard is released as soon as the token is dropped"]
#[derive(Debug)]
pub struct Entered<'a> {
    guard: &'a ReentrancyGuard,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard, failing with [`SettleError::Reentrancy`] if a call is in flight.
    pub fn enter(&self) -> Result<Entered<'_>> {
        self.entered
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| SettleError::Reentrancy)?;
        Ok(Entered { guard: self })
    }

    /// Check if a call is in flight.
    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        self.guard.entered.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_entry_rejected() {
        let guard = ReentrancyGuard::new();
        let entered = guard.enter().unwrap();
        assert!(guard.is_entered());
        assert_eq!(guard.enter().unwrap_err(), SettleError::Reentrancy);
        drop(entered);
        assert!(!guard.is_entered());
        assert!(guard.enter().is_ok());
    }

    #[test]
    fn test_released_on_error_path() {
        let guard = ReentrancyGuard::new();
        let run = || -> Result<()> {
            let _entered = guard.enter()?;
            Err(SettleError::Paused)
        };
        assert_eq!(run(), Err(SettleError::Paused));
        assert!(!guard.is_entered());
    }
}
