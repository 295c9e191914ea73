use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ClientSettings;
use crate::error::AppResult;
use crate::http::HttpTransport;
use crate::metrics::{
    Counters, MetricsEndpoint, MetricsSink, MetricsState, REPORT_INTERVAL, ResultAggregator,
    log_report, outcome_intake, setup_reporter,
};
use crate::shutdown::{ShutdownSender, shutdown_channel};
use crate::shutdown_handlers::{setup_deadline_shutdown_handler, setup_signal_shutdown_handler};
use crate::workload::{
    ConcurrencyLimiter, DrainReport, RequestExecutor, Scheduler, SchedulerReport, Transport,
    WorkloadConfig,
};

/// How long in-flight calls get to finish once the scheduler has stopped.
pub const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Peripheral settings of one client run.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub metrics_listen: Option<SocketAddr>,
    pub duration: Option<Duration>,
    pub report_interval: Duration,
    pub drain_grace: Duration,
}

impl RunOptions {
    #[must_use]
    pub const fn new(metrics_listen: Option<SocketAddr>, duration: Option<Duration>) -> Self {
        Self {
            metrics_listen,
            duration,
            report_interval: REPORT_INTERVAL,
            drain_grace: DRAIN_GRACE,
        }
    }
}

/// Final state of a client run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub ticks: u64,
    pub dispatched: u64,
    pub drained: DrainReport,
    pub counters: Counters,
    pub dropped: u64,
}

/// Runs the load generator against the configured target until interrupted
/// or until the configured duration elapses.
///
/// # Errors
///
/// Returns an error when the HTTP client cannot be built or the metrics
/// listener cannot be bound.
pub async fn run_client(settings: ClientSettings) -> AppResult<RunSummary> {
    let ClientSettings {
        target,
        credential,
        workload,
        metrics_listen,
        duration,
    } = settings;
    let transport = Arc::new(HttpTransport::new(&target, &credential)?);
    info!(url = %transport.ping_url(), "targeting liveness endpoint");

    let (shutdown_tx, _) = shutdown_channel();
    let signal_handle = setup_signal_shutdown_handler(&shutdown_tx);
    let options = RunOptions::new(metrics_listen, duration);
    let result = run_workload(workload, transport, options, &shutdown_tx).await;

    // A failed startup never fired shutdown; release the signal task now.
    let _sent = shutdown_tx.send(());
    join_quietly("signal handler", signal_handle).await;
    result
}

/// Wires limiter, intake, aggregator, reporter and the optional metrics
/// endpoint around a scheduler, runs it until `shutdown_tx` fires, then
/// drains in-flight calls and returns the final counters.
///
/// Shutdown only stops dispatch. Calls already running finish on their own
/// and are counted; those still running after `drain_grace` are aborted and
/// reported in `drained.aborted` instead of the counters.
///
/// # Errors
///
/// Returns an error when the metrics listener cannot be bound or a pipeline
/// task fails to join.
pub async fn run_workload<T: Transport>(
    config: WorkloadConfig,
    transport: Arc<T>,
    options: RunOptions,
    shutdown_tx: &ShutdownSender,
) -> AppResult<RunSummary> {
    let limiter = ConcurrencyLimiter::new(config.concurrent_requests());
    let (intake, receiver) = outcome_intake(config.intake_capacity());
    let dropped = intake.drop_counter();
    let sink = MetricsSink::new();

    let endpoint_handle = match options.metrics_listen {
        Some(addr) => {
            let state = MetricsState {
                view: sink.subscribe(),
                dropped: dropped.clone(),
                limiter: limiter.clone(),
            };
            let endpoint = MetricsEndpoint::bind(addr, state).await?;
            info!(addr = %endpoint.local_addr(), "serving metrics on /metrics");
            Some(tokio::spawn(endpoint.serve(shutdown_tx.clone())))
        }
        None => None,
    };

    let reporter_handle = setup_reporter(
        sink.subscribe(),
        dropped.clone(),
        options.report_interval,
        shutdown_tx,
    );
    let deadline_handle = options
        .duration
        .map(|limit| setup_deadline_shutdown_handler(shutdown_tx, limit));

    let (aggregator_tx, aggregator_rx) = shutdown_channel();
    let mut aggregator_handle =
        tokio::spawn(ResultAggregator::new(receiver, sink).run(aggregator_rx));

    let executor = RequestExecutor::new(transport, intake);
    let SchedulerReport {
        ticks,
        dispatched,
        in_flight,
    } = Scheduler::new(config, limiter.clone(), executor, shutdown_tx)
        .run()
        .await;

    if !in_flight.is_empty() {
        info!("Waiting for {} in-flight requests", in_flight.len());
    }
    let drained = in_flight.drain(options.drain_grace).await;
    if limiter.held() != 0 {
        warn!("{} permits still held after drain", limiter.held());
    }

    // Every intake handle is gone by now; the fallback only covers a stuck
    // consumer.
    let counters = match timeout(options.drain_grace, &mut aggregator_handle).await {
        Ok(joined) => joined?,
        Err(_elapsed) => {
            warn!("Aggregator still busy after drain, stopping it");
            let _sent = aggregator_tx.send(());
            aggregator_handle.await?
        }
    };

    join_quietly("reporter", reporter_handle).await;
    if let Some(handle) = endpoint_handle {
        join_quietly("metrics endpoint", handle).await;
    }
    if let Some(handle) = deadline_handle {
        join_quietly("deadline handler", handle).await;
    }

    let dropped = dropped.get();
    log_report(&counters, dropped);
    info!(
        ticks,
        dispatched,
        completed = drained.completed,
        aborted = drained.aborted,
        "client stopped"
    );

    Ok(RunSummary {
        ticks,
        dispatched,
        drained,
        counters,
        dropped,
    })
}

async fn join_quietly(name: &str, handle: JoinHandle<()>) {
    if let Err(err) = handle.await {
        debug!("{} task ended abnormally: {}", name, err);
    }
}
