//! Per-watch admission control.
//!
//! A [`ChangeGate`] admits at most one dispatch cycle at a time. Entry is a
//! single atomic compare-exchange: it never blocks and never queues. A
//! notification that finds the gate closed is dropped; the next notification
//! after the running cycle finishes starts a fresh cycle that observes the
//! latest state of the directory.
//!
//! Exit is tied to the lifetime of the returned [`GatePermit`], so the gate
//! reopens on every path out of a cycle, including errors and panics.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use fw_watcher::ChangeGate;
//!
//! let gate = Arc::new(ChangeGate::new());
//!
//! let permit = gate.try_enter().unwrap();
//! assert!(gate.try_enter().is_none()); // second notification dropped
//!
//! permit.exit();
//! assert!(gate.try_enter().is_some());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Drop-newest admission gate.
#[derive(Debug, Default)]
pub struct ChangeGate {
    busy: AtomicBool,
}

impl ChangeGate {
    /// Creates an open gate.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    /// Tries to admit a cycle.
    ///
    /// Returns a permit if the gate was open, `None` otherwise.
    #[must_use]
    pub fn try_enter(self: &Arc<Self>) -> Option<GatePermit> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()?;
        Some(GatePermit {
            gate: Arc::clone(self),
        })
    }

    /// Returns `true` while a cycle holds the gate.
    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn exit(&self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Proof of admission. Dropping it reopens the gate.
#[derive(Debug)]
#[must_use = "dropping the permit immediately reopens the gate"]
pub struct GatePermit {
    gate: Arc<ChangeGate>,
}

impl GatePermit {
    /// Releases the gate explicitly.
    #[inline]
    pub fn exit(self) {
        drop(self);
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[derive(Debug, Clone, Copy)]
    enum Body {
        Succeeds,
        Fails,
        Panics,
    }

    fn body() -> impl Strategy<Value = Body> {
        prop_oneof![Just(Body::Succeeds), Just(Body::Fails), Just(Body::Panics)]
    }

    fn run_cycle(gate: &Arc<ChangeGate>, body: Body) -> Result<(), String> {
        let _permit = gate.try_enter().ok_or("gate closed")?;
        match body {
            Body::Succeeds => Ok(()),
            Body::Fails => Err("dispatch failed".to_owned()),
            Body::Panics => panic!("dispatch panicked"),
        }
    }

    #[test]
    fn test_gate_starts_open() {
        let gate = Arc::new(ChangeGate::new());
        assert!(!gate.is_busy());
    }

    #[test]
    fn test_second_entry_is_rejected() {
        let gate = Arc::new(ChangeGate::new());
        let permit = gate.try_enter();
        assert!(permit.is_some());
        assert!(gate.is_busy());
        assert!(gate.try_enter().is_none());
        assert!(gate.try_enter().is_none());
        drop(permit);
        assert!(!gate.is_busy());
    }

    #[test]
    fn test_concurrent_entry_admits_exactly_one() {
        let gate = Arc::new(ChangeGate::new());
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let permits: Vec<Option<GatePermit>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let gate = Arc::clone(&gate);
                    let barrier = Arc::clone(&barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        gate.try_enter()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(permits.iter().filter(|p| p.is_some()).count(), 1);
    }

    proptest! {
        #[test]
        fn prop_gate_reopens_after_any_cycle(bodies in proptest::collection::vec(body(), 1..32)) {
            let gate = Arc::new(ChangeGate::new());
            for body in bodies {
                let outcome = catch_unwind(AssertUnwindSafe(|| run_cycle(&gate, body)));
                match body {
                    Body::Succeeds => prop_assert!(matches!(outcome, Ok(Ok(())))),
                    Body::Fails => prop_assert!(matches!(outcome, Ok(Err(_)))),
                    Body::Panics => prop_assert!(outcome.is_err()),
                }
                prop_assert!(!gate.is_busy());
            }
            prop_assert!(gate.try_enter().is_some());
        }
    }
}
