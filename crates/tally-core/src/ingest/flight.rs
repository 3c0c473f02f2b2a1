//! Single-flight gate for commit cycles.
//!
//! One caller leads a cycle; callers arriving while it runs block until it
//! finishes and observe its outcome instead of starting their own.

use crate::error::InternalError;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

type Outcome = Result<(), InternalError>;

///
/// FlightState
///

#[derive(Debug, Default)]
struct FlightState {
    running: bool,
    generation: u64,
    last: Option<Outcome>,
}

///
/// SingleFlight
///

#[derive(Debug, Default)]
pub struct SingleFlight {
    state: Mutex<FlightState>,
    landed: Condvar,
}

///
/// Flight
///
/// Leader  → the caller owns the cycle and must `finish` the guard.
/// Joined  → another caller ran the cycle; carries its outcome.
///

#[derive(Debug)]
pub enum Flight<'a> {
    Leader(FlightGuard<'a>),
    Joined(Outcome),
}

impl SingleFlight {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lead a new cycle, or wait for the running one to land.
    pub fn begin(&self) -> Flight<'_> {
        let mut state = self.lock();
        if !state.running {
            state.running = true;
            return Flight::Leader(FlightGuard {
                flight: self,
                finished: false,
            });
        }

        let generation = state.generation;
        while state.running && state.generation == generation {
            state = self
                .landed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        Flight::Joined(state.last.clone().unwrap_or(Ok(())))
    }

    /// True while a cycle is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    fn lock(&self) -> MutexGuard<'_, FlightState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn land(&self, outcome: Outcome) {
        let mut state = self.lock();
        state.running = false;
        state.generation = state.generation.wrapping_add(1);
        state.last = Some(outcome);
        drop(state);

        self.landed.notify_all();
    }
}

///
/// FlightGuard
///
/// Releases the gate when the leader finishes. Dropping an unfinished guard
/// (the cycle panicked) lands the flight with an internal error so waiters
/// wake up and a later commit can retry.
///

#[derive(Debug)]
pub struct FlightGuard<'a> {
    flight: &'a SingleFlight,
    finished: bool,
}

impl FlightGuard<'_> {
    /// Publish `outcome` to every waiter and hand it back to the leader.
    pub fn finish(mut self, outcome: Outcome) -> Outcome {
        self.finished = true;
        self.flight.land(outcome.clone());

        outcome
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            self.flight.land(Err(InternalError::ingest_internal(
                "commit cycle aborted before completion",
            )));
        }
    }
}
