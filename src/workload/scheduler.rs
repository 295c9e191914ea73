use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::shutdown::{ShutdownReceiver, ShutdownSender};

use super::config::WorkloadConfig;
use super::executor::RequestExecutor;
use super::limiter::ConcurrencyLimiter;
use super::transport::Transport;

/// Fixed-interval dispatcher. Each tick waits for one permit and launches
/// one executor task; it never waits for that task to finish.
///
/// Missed ticks are skipped: while an acquire is pending no further ticks
/// accumulate, and once capacity frees up the cadence resumes from the next
/// interval boundary instead of bursting to catch up.
pub struct Scheduler<T> {
    config: WorkloadConfig,
    limiter: ConcurrencyLimiter,
    executor: RequestExecutor<T>,
    shutdown_rx: ShutdownReceiver,
}

/// Counters describing a finished scheduler run plus the tasks it left
/// running.
pub struct SchedulerReport {
    pub ticks: u64,
    pub dispatched: u64,
    pub in_flight: InFlight,
}

impl<T: Transport> Scheduler<T> {
    /// Subscribes to shutdown right away, so a signal sent before `run` is
    /// first polled still stops the scheduler.
    #[must_use]
    pub fn new(
        config: WorkloadConfig,
        limiter: ConcurrencyLimiter,
        executor: RequestExecutor<T>,
        shutdown_tx: &ShutdownSender,
    ) -> Self {
        let shutdown_rx = shutdown_tx.subscribe();
        Self {
            config,
            limiter,
            executor,
            shutdown_rx,
        }
    }

    /// Runs until the shutdown signal fires, then stops the timer and returns
    /// without waiting for dispatched calls. Those keep running until their
    /// own completion or deadline.
    pub async fn run(mut self) -> SchedulerReport {
        let mut ticker = interval(self.config.delay());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tasks = JoinSet::new();
        let mut ticks: u64 = 0;
        let mut dispatched: u64 = 0;

        info!(
            delay = ?self.config.delay(),
            concurrency = self.config.concurrent_requests().get(),
            "starting client workload"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join_result(joined),
                _ = ticker.tick() => {
                    ticks = ticks.saturating_add(1);
                    let Ok(permit) = self.limiter.acquire(&mut self.shutdown_rx).await else {
                        break;
                    };
                    let executor = self.executor.clone();
                    tasks.spawn(async move {
                        executor.execute(permit).await;
                    });
                    dispatched = dispatched.saturating_add(1);
                }
            }
        }

        debug!(
            ticks,
            dispatched,
            in_flight = tasks.len(),
            "scheduler stopped"
        );

        SchedulerReport {
            ticks,
            dispatched,
            in_flight: InFlight { tasks },
        }
    }
}

/// Executor tasks still running when the scheduler stopped.
pub struct InFlight {
    tasks: JoinSet<()>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: usize,
    pub aborted: usize,
}

impl InFlight {
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Lets the remaining calls finish in the background. Their outcomes and
    /// permit releases still happen; nobody waits for them.
    #[must_use]
    pub fn detach(mut self) -> usize {
        let detached = self.tasks.len();
        self.tasks.detach_all();
        detached
    }

    /// Waits up to `grace` for the remaining calls, then aborts whatever is
    /// left. Aborted tasks record no outcome and release their permits when
    /// dropped.
    pub async fn drain(mut self, grace: Duration) -> DrainReport {
        let mut report = DrainReport::default();
        let deadline = Instant::now()
            .checked_add(grace)
            .unwrap_or_else(Instant::now);

        loop {
            match tokio::time::timeout_at(deadline, self.tasks.join_next()).await {
                Ok(Some(joined)) => {
                    log_join_result(joined);
                    report.completed = report.completed.saturating_add(1);
                }
                Ok(None) => return report,
                Err(_elapsed) => break,
            }
        }

        warn!(
            "Aborting {} in-flight requests after {:?} grace period",
            self.tasks.len(),
            grace
        );
        self.tasks.abort_all();
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(()) => report.completed = report.completed.saturating_add(1),
                Err(_cancelled) => report.aborted = report.aborted.saturating_add(1),
            }
        }
        report
    }
}

fn log_join_result(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        if err.is_panic() {
            error!("Request task panicked: {}", err);
        } else {
            debug!("Request task cancelled: {}", err);
        }
    }
}
