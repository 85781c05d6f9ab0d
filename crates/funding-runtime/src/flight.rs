//! In-flight gate: at most one bridge submission or confirmation at a time

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared by the Checker and the Reconciler
#[derive(Clone, Debug, Default)]
pub struct FlightGate {
    busy: Arc<AtomicBool>,
}

impl FlightGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate, or `None` if something is already in flight
    pub fn try_acquire(&self) -> Option<FlightPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightPermit {
                busy: self.busy.clone(),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the gate on drop, including on early return
#[derive(Debug)]
pub struct FlightPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_holder() {
        let gate = FlightGate::new();
        let permit = gate.try_acquire().unwrap();
        assert!(gate.is_busy());
        assert!(gate.try_acquire().is_none());
        assert!(gate.clone().try_acquire().is_none());

        drop(permit);
        assert!(!gate.is_busy());
        assert!(gate.try_acquire().is_some());
    }
}
