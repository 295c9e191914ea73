//! Core library for the `loadtest` CLI.
//!
//! The crate drives open-loop, bounded-concurrency traffic at a target's
//! liveness route and aggregates every outcome into labeled counters: a
//! fixed-interval scheduler hands permits from a concurrency limiter to
//! per-request executors, whose outcomes flow through a bounded intake into
//! a single aggregator. The counters are exposed over a Prometheus endpoint
//! and logged periodically. A small target service (liveness with artificial
//! latency plus a WebSocket echo) lives alongside so the generator can be
//! exercised end to end.
pub mod app;
pub mod args;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod shutdown_handlers;
pub mod workload;
