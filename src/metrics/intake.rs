use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::workload::Outcome;

/// Result of offering an outcome to the intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Queue at capacity; the outcome was discarded.
    DroppedFull,
    /// Aggregator already stopped; the outcome was discarded.
    DroppedClosed,
}

/// Shared count of outcomes discarded by the intake.
#[derive(Debug, Clone, Default)]
pub struct DropCounter(Arc<AtomicU64>);

impl DropCounter {
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// Producer side of the bounded queue feeding the aggregator. Cloned into
/// every executor task.
#[derive(Debug, Clone)]
pub struct OutcomeIntake {
    tx: mpsc::Sender<Outcome>,
    dropped: DropCounter,
}

/// Consumer side, owned by the aggregator.
#[derive(Debug)]
pub struct OutcomeReceiver {
    rx: mpsc::Receiver<Outcome>,
}

/// Builds a bounded intake holding at most `capacity` undelivered outcomes.
/// A zero capacity is raised to one.
#[must_use]
pub fn outcome_intake(capacity: usize) -> (OutcomeIntake, OutcomeReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        OutcomeIntake {
            tx,
            dropped: DropCounter::default(),
        },
        OutcomeReceiver { rx },
    )
}

impl OutcomeIntake {
    /// Offers an outcome without ever waiting for queue space.
    pub fn deliver(&self, outcome: Outcome) -> Delivery {
        match self.tx.try_send(outcome) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(outcome)) => {
                self.dropped.increment();
                warn!(
                    status_code = outcome.status_code,
                    "task result dropped, intake full"
                );
                Delivery::DroppedFull
            }
            Err(TrySendError::Closed(outcome)) => {
                self.dropped.increment();
                debug!(
                    status_code = outcome.status_code,
                    "task result dropped, aggregator stopped"
                );
                Delivery::DroppedClosed
            }
        }
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }

    #[must_use]
    pub fn drop_counter(&self) -> DropCounter {
        self.dropped.clone()
    }
}

impl OutcomeReceiver {
    pub(super) async fn recv(&mut self) -> Option<Outcome> {
        self.rx.recv().await
    }
}
