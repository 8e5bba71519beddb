//! Per-category busy gates.
//!
//! Each destructive operation category owns a gate moving `Idle -> Busy ->
//! Idle`. User-initiated operations are rejected while the gate is busy;
//! follow-up operations queue for it instead. The returned guard puts the
//! gate back to `Idle` when dropped, on every exit path.

use crate::error::{LifecycleError, LifecycleResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationCategory {
    Unload,
    Reload,
}

impl fmt::Display for OperationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationCategory::Unload => f.write_str("unload"),
            OperationCategory::Reload => f.write_str("reload"),
        }
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyState {
    Idle,
    Busy,
}

#[derive(Debug, Clone)]
pub struct BusyGate {
    category: OperationCategory,
    // One permit: held means busy.
    permit: Arc<Semaphore>,
}

impl BusyGate {
    pub fn new(category: OperationCategory) -> Self {
        Self {
            category,
            permit: Arc::new(Semaphore::new(1)),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> BusyState {
        if self.permit.available_permits() == 0 {
            BusyState::Busy
        } else {
            BusyState::Idle
        }
    }

    /// Move `Idle -> Busy`, or fail with `LifecycleError::Busy`.
    pub fn try_acquire(&self) -> LifecycleResult<BusyGuard> {
        self.permit
            .clone()
            .try_acquire_owned()
            .map(|permit| BusyGuard { _permit: permit })
            .map_err(|_| LifecycleError::Busy(self.category))
    }

    /// Wait until the gate is `Idle`, then take it. `None` only if the gate
    /// was closed.
    pub async fn acquire(&self) -> Option<BusyGuard> {
        self.permit
            .clone()
            .acquire_owned()
            .await
            .ok()
            .map(|permit| BusyGuard { _permit: permit })
    }
}

/// Holds a gate in `Busy`; dropping it returns the gate to `Idle`.
#[derive(Debug)]
pub struct BusyGuard {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_cycles_idle_busy_idle() {
        let gate = BusyGate::new(OperationCategory::Unload);
        assert_eq!(gate.state(), BusyState::Idle);

        let guard = gate.try_acquire().expect("idle gate");
        assert_eq!(gate.state(), BusyState::Busy);
        assert_eq!(
            gate.try_acquire().unwrap_err(),
            LifecycleError::Busy(OperationCategory::Unload)
        );

        drop(guard);
        assert_eq!(gate.state(), BusyState::Idle);
        assert!(gate.try_acquire().is_ok());
    }

    #[test]
    fn gates_are_independent_per_category() {
        let unload = BusyGate::new(OperationCategory::Unload);
        let reload = BusyGate::new(OperationCategory::Reload);
        let _held = unload.try_acquire().expect("idle gate");
        assert!(reload.try_acquire().is_ok());
    }

    #[test]
    fn guard_releases_on_unwind() {
        let gate = BusyGate::new(OperationCategory::Reload);
        let cloned = gate.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = cloned.try_acquire().expect("idle gate");
            panic!("operation blew up");
        }));
        assert!(result.is_err());
        assert_eq!(gate.state(), BusyState::Idle);
    }

    #[tokio::test]
    async fn acquire_waits_for_release() {
        let gate = BusyGate::new(OperationCategory::Reload);
        let held = gate.try_acquire().expect("idle gate");

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await.is_some() })
        };
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(!waiter.is_finished());

        drop(held);
        assert!(waiter.await.expect("join"));
        assert_eq!(gate.state(), BusyState::Idle);
    }
}
