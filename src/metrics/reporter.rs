use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::shutdown::ShutdownSender;

use super::counters::Counters;
use super::intake::DropCounter;
use super::sink::CountersView;

pub const REPORT_INTERVAL: Duration = Duration::from_secs(2);

/// Logs running totals every `period` until shutdown.
pub fn setup_reporter(
    view: CountersView,
    dropped: DropCounter,
    period: Duration,
    shutdown_tx: &ShutdownSender,
) -> JoinHandle<()> {
    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; skip the empty report.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    view.with(|counters| log_report(counters, dropped.get()));
                }
            }
        }
    })
}

pub(crate) fn log_report(counters: &Counters, dropped: u64) {
    info!(
        success = counters.successes(),
        failure = counters.failures(),
        network_errors = counters.transport_failures(),
        dropped,
        "reporting results"
    );
    for (outcome, count) in counters.iter() {
        debug!(
            code = outcome.status_code,
            status = %outcome.status_label,
            count,
            "responses by status"
        );
    }
}
