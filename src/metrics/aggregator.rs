use tracing::debug;

use crate::shutdown::ShutdownReceiver;
use crate::workload::Outcome;

use super::counters::Counters;
use super::intake::OutcomeReceiver;
use super::sink::MetricsSink;

/// Single consumer of the outcome intake. Owns the counters outright, so the
/// map needs no locking; readers only ever see published snapshots.
pub struct ResultAggregator {
    intake: OutcomeReceiver,
    counters: Counters,
    sink: MetricsSink,
}

impl ResultAggregator {
    #[must_use]
    pub fn new(intake: OutcomeReceiver, sink: MetricsSink) -> Self {
        Self {
            intake,
            counters: Counters::default(),
            sink,
        }
    }

    /// Drains outcomes until shutdown fires or every producer is gone, and
    /// returns the final counters.
    pub async fn run(mut self, mut shutdown_rx: ShutdownReceiver) -> Counters {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                received = self.intake.recv() => match received {
                    Some(outcome) => self.record(outcome),
                    None => break,
                },
            }
        }
        debug!(total = self.counters.total(), "aggregator stopped");
        self.counters
    }

    fn record(&mut self, outcome: Outcome) {
        self.counters.increment(outcome);
        self.sink.publish(&self.counters);
    }
}
