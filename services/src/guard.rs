//! Non-reentrancy guard for background cycles.
//!
//! A cycle enters by swapping the state Idle→Running; a concurrent attempt
//! observes Running and is turned away instead of queued. The returned
//! [`CyclePermit`] resets the state on drop, including on an early `?`
//! return or a panic unwinding through the cycle.

use std::sync::atomic::{AtomicU8, Ordering};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Running,
}

#[derive(Debug, Default)]
pub struct CycleGuard {
    state: AtomicU8,
}

impl CycleGuard {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
        }
    }

    /// Claim the guard, or `None` if a cycle already holds it.
    pub fn try_enter(&self) -> Option<CyclePermit<'_>> {
        self.state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CyclePermit { guard: self })
    }

    pub fn state(&self) -> CycleState {
        match self.state.load(Ordering::Acquire) {
            IDLE => CycleState::Idle,
            _ => CycleState::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == CycleState::Running
    }
}

/// Proof of an entered cycle; releases the guard when dropped.
#[must_use = "the guard is released as soon as the permit is dropped"]
#[derive(Debug)]
pub struct CyclePermit<'a> {
    guard: &'a CycleGuard,
}

impl Drop for CyclePermit<'_> {
    fn drop(&mut self) {
        self.guard.state.store(IDLE, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_entry_is_refused_until_release() {
        let guard = CycleGuard::new();
        let permit = guard.try_enter().expect("first entry");
        assert!(guard.is_running());
        assert!(guard.try_enter().is_none());
        drop(permit);
        assert_eq!(guard.state(), CycleState::Idle);
        assert!(guard.try_enter().is_some());
    }

    #[test]
    fn panic_inside_cycle_releases_guard() {
        let guard = CycleGuard::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _permit = guard.try_enter().unwrap();
            panic!("cycle blew up");
        }));
        assert!(result.is_err());
        assert!(!guard.is_running());
    }
}
