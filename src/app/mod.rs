//! Command wiring: turns resolved settings into a running client or server.
mod client;
mod server;


pub use client::{DRAIN_GRACE, RunOptions, RunSummary, run_client, run_workload};
pub use server::run_server;
