//! Metric instrument factories for itemflow.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"itemflow"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for itemflow instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("itemflow")
}

/// Counter: events appended or prepended to item logs.
/// Labels: `event_id`, `outcome`.
pub fn events_appended() -> Counter<u64> {
    meter()
        .u64_counter("itemflow.events.appended")
        .with_description("Number of events written to item logs")
        .build()
}

/// Counter: log update attempts by final result.
/// Labels: `operation`, `result` ("ok" | "noop" | "exhausted" | "error").
pub fn log_updates() -> Counter<u64> {
    meter()
        .u64_counter("itemflow.log.updates")
        .with_description("Number of event log updates")
        .build()
}

/// Counter: conditional writes rejected because the log moved on.
/// Labels: `operation`.
pub fn cas_conflicts() -> Counter<u64> {
    meter()
        .u64_counter("itemflow.log.cas_conflicts")
        .with_description("Number of version conflicts on conditional writes")
        .build()
}

/// Counter: events removed by restarts and removals.
/// Labels: `operation`.
pub fn events_removed() -> Counter<u64> {
    meter()
        .u64_counter("itemflow.log.events_removed")
        .with_description("Number of events removed from item logs")
        .build()
}

/// Counter: index pages fetched.
pub fn index_pages() -> Counter<u64> {
    meter()
        .u64_counter("itemflow.index.pages")
        .with_description("Number of index result pages fetched")
        .build()
}

/// Counter: index candidates by verdict after the exact re-check.
/// Labels: `result` ("matched" | "rejected" | "missing").
pub fn trigger_candidates() -> Counter<u64> {
    meter()
        .u64_counter("itemflow.trigger.candidates")
        .with_description("Index candidates re-checked against the repository")
        .build()
}

/// Counter: work component executions.
/// Labels: `component`, `outcome`.
pub fn work_executed() -> Counter<u64> {
    meter()
        .u64_counter("itemflow.work.executed")
        .with_description("Number of work component executions")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("itemflow.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
