//! Load generation pipeline: cadence, concurrency limiting and per-request
//! execution.
mod config;
mod executor;
mod limiter;
mod outcome;
mod scheduler;
mod transport;

#[cfg(test)]
mod tests;

pub use config::WorkloadConfig;
pub use executor::{REQUEST_DEADLINE, RequestExecutor};
pub use limiter::{Cancelled, ConcurrencyLimiter, Permit};
pub use outcome::{Outcome, SUCCESS_STATUS, TRANSPORT_FAILURE_CODE};
pub use scheduler::{DrainReport, InFlight, Scheduler, SchedulerReport};
pub use transport::{CallResponse, Transport};
