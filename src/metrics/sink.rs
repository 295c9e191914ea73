use tokio::sync::watch;

use super::counters::Counters;

/// Holds the most recent counters snapshot. The aggregator pushes into it
/// after every update; readers see the latest value only.
#[derive(Debug, Clone)]
pub struct MetricsSink {
    tx: watch::Sender<Counters>,
}

/// Read handle on a [`MetricsSink`].
#[derive(Debug, Clone)]
pub struct CountersView {
    rx: watch::Receiver<Counters>,
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Counters::default());
        Self { tx }
    }

    pub(super) fn publish(&self, counters: &Counters) {
        self.tx.send_replace(counters.clone());
    }

    #[must_use]
    pub fn subscribe(&self) -> CountersView {
        CountersView {
            rx: self.tx.subscribe(),
        }
    }
}

impl CountersView {
    #[must_use]
    pub fn snapshot(&self) -> Counters {
        self.rx.borrow().clone()
    }

    /// Reads the latest snapshot without cloning it.
    pub fn with<R>(&self, read: impl FnOnce(&Counters) -> R) -> R {
        read(&self.rx.borrow())
    }

    /// Waits until `predicate` holds for the latest snapshot and returns a
    /// copy of it. Returns `None` if the sink is gone first.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&Counters) -> bool,
    ) -> Option<Counters> {
        self.rx
            .wait_for(|counters| predicate(counters))
            .await
            .ok()
            .map(|counters| (*counters).clone())
    }
}
