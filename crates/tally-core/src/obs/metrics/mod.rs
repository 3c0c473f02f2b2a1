use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use time::OffsetDateTime;

///
/// EventState
/// Ephemeral, process-wide counters for ingest and commit activity.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub window_start_ms: u64,
}

impl EventState {
    const fn empty() -> Self {
        Self {
            ops: EventOps::empty(),
            window_start_ms: 0,
        }
    }

    fn fresh() -> Self {
        Self {
            ops: EventOps::default(),
            window_start_ms: now_millis(),
        }
    }
}

impl Default for EventState {
    fn default() -> Self {
        Self::fresh()
    }
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Ingest entrypoints
    pub docs_queued: u64,
    pub docs_rejected: u64,

    // Commit cycles
    pub commits_started: u64,
    pub commits_finished: u64,
    pub commits_failed: u64,

    // Per-key outcomes
    pub keys_inserted: u64,
    pub keys_merged: u64,
    pub keys_unreduced: u64,
    pub keys_skipped: u64,

    // Documents handed to chained stages
    pub chain_forwards: u64,
}

impl EventOps {
    const fn empty() -> Self {
        Self {
            docs_queued: 0,
            docs_rejected: 0,
            commits_started: 0,
            commits_finished: 0,
            commits_failed: 0,
            keys_inserted: 0,
            keys_merged: 0,
            keys_unreduced: 0,
            keys_skipped: 0,
            chain_forwards: 0,
        }
    }
}

///
/// EventReport
/// Snapshot returned by `metrics_report`; empty when the window started
/// after the requested start.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    pub counters: Option<EventState>,
}

static EVENT_STATE: Mutex<EventState> = Mutex::new(EventState::empty());

fn lock() -> MutexGuard<'static, EventState> {
    EVENT_STATE.lock().unwrap_or_else(PoisonError::into_inner)
}

#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn now_millis() -> u64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).max(0) as u64
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    f(&lock())
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    let mut state = lock();
    if state.window_start_ms == 0 {
        state.window_start_ms = now_millis();
    }

    f(&mut state)
}

/// Reset all counters and start a new window.
pub(crate) fn reset_all() {
    *lock() = EventState::fresh();
}

/// Snapshot counters unless the current window started before `window_start_ms`.
pub(crate) fn report_window_start(window_start_ms: Option<u64>) -> EventReport {
    let snapshot = with_state(Clone::clone);
    let within = window_start_ms.is_none_or(|start| start <= snapshot.window_start_ms);

    EventReport {
        counters: within.then_some(snapshot),
    }
}
