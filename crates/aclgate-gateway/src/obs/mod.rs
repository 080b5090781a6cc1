//! Lightweight in-process metrics (dependency-free).
//!
//! Counters and gauges are stored as atomics and rendered through the
//! `metrics` admin request.

pub mod metrics;

pub use metrics::GatewayMetrics;
