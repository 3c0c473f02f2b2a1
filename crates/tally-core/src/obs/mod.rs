//! Observability: runtime telemetry (metrics) and sink abstractions.
//!
//! Engine code never touches the global counters directly; every
//! measurement flows through a `MetricsSink`.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EventOps, EventReport, EventState};
pub use sink::{
    GlobalMetricsSink, KeyOutcome, MetricsEvent, MetricsSink, SinkRef, global_sink,
    metrics_report, metrics_reset_all,
};
