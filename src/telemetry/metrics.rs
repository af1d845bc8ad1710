//! Metric instrument factories for worktrack.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"worktrack"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("worktrack")
}

/// Counter: works created.
/// Labels: `connector_type`, `result` ("ok" | "error").
pub fn works_created() -> Counter<u64> {
    meter()
        .u64_counter("worktrack.works.created")
        .with_description("Number of works created")
        .build()
}

/// Counter: progress reports received from connectors.
/// Labels: `kind` ("received" | "processed" | "action" | "ping").
pub fn work_reports() -> Counter<u64> {
    meter()
        .u64_counter("worktrack.works.reports")
        .with_description("Number of work progress reports")
        .build()
}

/// Counter: works finalized. Incremented only by the write that finalized.
/// Labels: `path` ("processed" | "action").
pub fn works_completed() -> Counter<u64> {
    meter()
        .u64_counter("worktrack.works.completed")
        .with_description("Number of works finalized")
        .build()
}

/// Counter: works deleted.
/// Labels: `reason` ("explicit" | "source" | "connector" | "retention").
pub fn works_deleted() -> Counter<u64> {
    meter()
        .u64_counter("worktrack.works.deleted")
        .with_description("Number of works deleted")
        .build()
}

/// Counter: counter-store operations.
/// Labels: `operation`.
pub fn counter_operations() -> Counter<u64> {
    meter()
        .u64_counter("worktrack.counter.operations")
        .with_description("Number of counter store operations")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("worktrack.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
