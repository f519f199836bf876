//! Grab-loop state and the pause/resume wait primitive

use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::model::GrabState;

/// [`GrabState`] stored in an atomic so the loop and callers can race on it
#[derive(Debug)]
pub(crate) struct AtomicGrabState(AtomicU8);

impl AtomicGrabState {
    pub(crate) fn new(state: GrabState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> GrabState {
        GrabState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn store(&self, state: GrabState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Moves from `from` to `to`; returns false if the state was not `from`
    pub(crate) fn transition(&self, from: GrabState, to: GrabState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Auto-reset event
///
/// `set` wakes exactly one waiter, or lets the next `wait` return
/// immediately if nobody is waiting. The signal is consumed by the waiter.
#[derive(Debug, Default)]
pub(crate) struct PauseEvent {
    signaled: Mutex<bool>,
    cond:     Condvar,
}

impl PauseEvent {
    pub(crate) fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.cond.wait(&mut signaled);
        }
        *signaled = false;
    }

    pub(crate) fn set(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.cond.notify_one();
    }
}
