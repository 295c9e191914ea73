//! Outcome intake, aggregation into labeled counters, and the surfaces that
//! expose them.
mod aggregator;
mod counters;
mod endpoint;
mod exposition;
mod intake;
mod reporter;
mod sink;


pub use aggregator::ResultAggregator;
pub use counters::Counters;
pub use endpoint::{MetricsEndpoint, MetricsState};
pub use exposition::{RunGauges, render_exposition};
pub use intake::{Delivery, DropCounter, OutcomeIntake, OutcomeReceiver, outcome_intake};
pub use reporter::{REPORT_INTERVAL, setup_reporter};
pub(crate) use reporter::log_report;
pub use sink::{CountersView, MetricsSink};
