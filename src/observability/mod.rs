//! Observability subsystem.
//!
//! Structured logging goes through `tracing` at the call sites; this module
//! carries the metrics facade. Metrics are cheap atomic updates behind the
//! `metrics` crate, exposed on a Prometheus scrape endpoint.

pub mod metrics;
