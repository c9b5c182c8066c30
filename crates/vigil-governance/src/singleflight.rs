use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};
use vigil_core::Decision;

enum FlightState {
    Pending,
    Done(Decision),
    Abandoned,
}

/// One in-flight computation that concurrent callers for the same key wait on.
pub(crate) struct Flight {
    state: Mutex<FlightState>,
    ready: Condvar,
}

impl Flight {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FlightState::Pending),
            ready: Condvar::new(),
        }
    }

    pub(crate) fn complete(&self, decision: Decision) {
        *self.state.lock() = FlightState::Done(decision);
        self.ready.notify_all();
    }

    /// Release waiters without a result (the leader panicked).
    pub(crate) fn abandon(&self) {
        let mut state = self.state.lock();
        if matches!(*state, FlightState::Pending) {
            *state = FlightState::Abandoned;
        }
        drop(state);
        self.ready.notify_all();
    }

    /// `None` on timeout or abandonment; the caller then computes for itself.
    pub(crate) fn wait(&self, timeout: Duration) -> Option<Decision> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            match &*state {
                FlightState::Done(decision) => return Some(decision.clone()),
                FlightState::Abandoned => return None,
                FlightState::Pending => {}
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                return match &*state {
                    FlightState::Done(decision) => Some(decision.clone()),
                    _ => None,
                };
            }
        }
    }
}
