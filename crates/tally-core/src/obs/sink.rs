//! Metrics sink boundary.
//!
//! Ingest and commit logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
//!
//! `GlobalMetricsSink` is the only bridge between execution logic and the
//! process-wide metrics state.

use crate::obs::metrics;
use std::sync::Arc;

///
/// KeyOutcome
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyOutcome {
    Inserted,
    Merged,
    Unreduced,
    Skipped,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent {
    DocQueued { retract: bool },
    DocRejected,
    CommitStart,
    CommitFinish { keys_touched: u64 },
    CommitFailed,
    Key { outcome: KeyOutcome },
    ChainForward { docs: u64 },
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent);
}

/// Shared sink handle held by every ingestor of one aggregation.
pub type SinkRef = Arc<dyn MetricsSink>;

///
/// GlobalMetricsSink
/// Default sink that writes into the process-wide metrics state.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent) {
        metrics::with_state_mut(|m| {
            let ops = &mut m.ops;
            match event {
                MetricsEvent::DocQueued { .. } => {
                    ops.docs_queued = ops.docs_queued.saturating_add(1);
                }
                MetricsEvent::DocRejected => {
                    ops.docs_rejected = ops.docs_rejected.saturating_add(1);
                }
                MetricsEvent::CommitStart => {
                    ops.commits_started = ops.commits_started.saturating_add(1);
                }
                MetricsEvent::CommitFinish { .. } => {
                    ops.commits_finished = ops.commits_finished.saturating_add(1);
                }
                MetricsEvent::CommitFailed => {
                    ops.commits_failed = ops.commits_failed.saturating_add(1);
                }
                MetricsEvent::Key { outcome } => {
                    let slot = match outcome {
                        KeyOutcome::Inserted => &mut ops.keys_inserted,
                        KeyOutcome::Merged => &mut ops.keys_merged,
                        KeyOutcome::Unreduced => &mut ops.keys_unreduced,
                        KeyOutcome::Skipped => &mut ops.keys_skipped,
                    };
                    *slot = slot.saturating_add(1);
                }
                MetricsEvent::ChainForward { docs } => {
                    ops.chain_forwards = ops.chain_forwards.saturating_add(docs);
                }
            }
        });
    }
}

/// Handle to the process-wide sink.
#[must_use]
pub fn global_sink() -> SinkRef {
    Arc::new(GlobalMetricsSink)
}

/// Snapshot the current metrics state.
///
/// `window_start_ms` filters by window start (`EventState::window_start_ms`),
/// not by per-event timestamps.
#[must_use]
pub fn metrics_report(window_start_ms: Option<u64>) -> metrics::EventReport {
    metrics::report_window_start(window_start_ms)
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}
