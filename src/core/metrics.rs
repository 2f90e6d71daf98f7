// src/core/metrics.rs

//! Defines and registers Prometheus metrics for client-side monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, TextEncoder, register_counter, register_counter_vec,
    register_gauge,
};

lazy_static! {
    // --- Connection Gauges ---
    /// The number of CFE connections currently open.
    pub static ref OPEN_CONNECTIONS: Gauge =
        register_gauge!("bifrost_open_connections", "Number of currently open CFE connections.").unwrap();

    // --- Counters ---
    /// The total number of connections established since startup.
    pub static ref CONNECTIONS_OPENED_TOTAL: Counter =
        register_counter!("bifrost_connections_opened_total", "Total number of CFE connections opened.").unwrap();
    /// The total number of operations started.
    pub static ref OPERATIONS_STARTED_TOTAL: Counter =
        register_counter!("bifrost_operations_started_total", "Total number of operations started.").unwrap();
    /// Finished operations, labeled by outcome (result, server_error, unauthorized, timeout, disconnected).
    pub static ref OPERATIONS_FINISHED_TOTAL: CounterVec =
        register_counter_vec!("bifrost_operations_finished_total", "Total number of operations finished, labeled by outcome.", &["outcome"]).unwrap();
    /// Inbound frames an operation could not decode and dropped.
    pub static ref DROPPED_FRAMES_TOTAL: Counter =
        register_counter!("bifrost_dropped_frames_total", "Total number of inbound frames dropped because they failed to decode.").unwrap();
    /// Connections force-closed after the CFE pushed a not-authorized error.
    pub static ref UNAUTHORIZED_CLOSES_TOTAL: Counter =
        register_counter!("bifrost_unauthorized_closes_total", "Total number of connections closed after an unauthorized push.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
