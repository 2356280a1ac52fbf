//! Cooperative cancellation for tree builds.
//!
//! Any holder of an [`InterruptHandle`] may request that the running build
//! stop. The build loop checks the request between records, never in the
//! middle of applying one, so the tree is always structurally consistent.

use log::debug;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No build running and nothing requested
    Idle,
    Running,
    Requested,
    Acknowledged,
    Finished,
}

/// How a build resolved an interrupt request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOutcome {
    /// The build loop stopped because of the request
    Interrupted,

    /// The build ended on its own (completed or failed) before noticing
    Finished,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    changed: Condvar,
}

/// Cloneable cancellation token shared between a builder and its callers
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    shared: Arc<Shared>,
}

impl Default for InterruptHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Idle),
                changed: Condvar::new(),
            }),
        }
    }

    /// Request cancellation of the running (or next) build
    ///
    /// Idempotent: every call made before the request resolves returns the
    /// same pending signal.
    pub fn interrupt(&self) -> PendingInterrupt {
        let mut state = self.shared.state.lock();
        // A resolved state belongs to the previous build; the request targets the next one
        if *state != State::Requested {
            debug!("Interrupt requested");
            *state = State::Requested;
        }

        PendingInterrupt {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_requested(&self) -> bool {
        *self.shared.state.lock() == State::Requested
    }

    /// Build loop: a build is starting; a request made beforehand is kept
    pub(crate) fn begin(&self) {
        let mut state = self.shared.state.lock();
        if *state != State::Requested {
            *state = State::Running;
        }
    }

    /// Build loop: the request was observed and the build is stopping
    pub(crate) fn acknowledge(&self) {
        self.resolve(State::Acknowledged);
    }

    /// Build loop: the build ended without observing a request
    pub(crate) fn finish(&self) {
        self.resolve(State::Finished);
    }

    fn resolve(&self, resolved: State) {
        let mut state = self.shared.state.lock();
        *state = resolved;
        self.shared.changed.notify_all();
    }
}

/// Signal returned by [`InterruptHandle::interrupt`]
#[derive(Debug, Clone)]
pub struct PendingInterrupt {
    shared: Arc<Shared>,
}

impl PendingInterrupt {
    /// Outcome if already resolved
    pub fn try_outcome(&self) -> Option<InterruptOutcome> {
        outcome_of(*self.shared.state.lock())
    }

    /// Block until the build loop resolves the request
    pub fn wait(&self) -> InterruptOutcome {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(outcome) = outcome_of(*state) {
                return outcome;
            }
            self.shared.changed.wait(&mut state);
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> Option<InterruptOutcome> {
        let mut state = self.shared.state.lock();
        if let Some(outcome) = outcome_of(*state) {
            return Some(outcome);
        }
        self.shared.changed.wait_for(&mut state, timeout);
        outcome_of(*state)
    }

    pub fn same_signal(&self, other: &PendingInterrupt) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

fn outcome_of(state: State) -> Option<InterruptOutcome> {
    match state {
        State::Acknowledged => Some(InterruptOutcome::Interrupted),
        State::Finished => Some(InterruptOutcome::Finished),
        State::Idle | State::Running | State::Requested => None,
    }
}
