use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use proptest::prelude::*;

use super::*;
use crate::args::PositiveUsize;
use crate::error::{AppError, AppResult, TransportError, ValidationError};
use crate::metrics::{Counters, Delivery, MetricsSink, ResultAggregator, outcome_intake};
use crate::shutdown::{ShutdownSender, shutdown_channel};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn run_async_test<F>(future: F) -> AppResult<()>
where
    F: Future<Output = AppResult<()>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::validation(format!("Failed to build runtime: {}", err)))?;
    runtime.block_on(future)
}

fn positive(value: usize) -> AppResult<PositiveUsize> {
    Ok(PositiveUsize::try_from(value)?)
}

/// One scripted call: wait `latency`, then answer with `reply`.
#[derive(Debug, Clone)]
struct Step {
    latency: Duration,
    reply: Reply,
}

#[derive(Debug, Clone)]
enum Reply {
    Status(u16),
    Failure(&'static str),
    /// Never answers; the call only ends at its deadline or when aborted.
    Hang,
}

impl Step {
    const fn status(code: u16) -> Self {
        Self {
            latency: Duration::ZERO,
            reply: Reply::Status(code),
        }
    }

    const fn failure(description: &'static str) -> Self {
        Self {
            latency: Duration::ZERO,
            reply: Reply::Failure(description),
        }
    }
}

/// Plays back a fixed script, then `fallback` for every further call.
/// Tracks how many calls are running at once.
struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicU64,
}

impl ScriptedTransport {
    fn new(script: impl IntoIterator<Item = Step>, fallback: Step) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: AtomicU64::new(0),
        })
    }

    fn next_step(&self) -> Step {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }

    fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// Decrements the active-call gauge however the call ends.
struct ActiveGuard<'transport>(&'transport AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn call(&self) -> Result<CallResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        self.max_active.fetch_max(active, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        let step = self.next_step();
        if !step.latency.is_zero() {
            tokio::time::sleep(step.latency).await;
        }
        match step.reply {
            Reply::Status(code) => StatusCode::from_u16(code)
                .map(|status| CallResponse { status })
                .map_err(|_err| TransportError::Request {
                    description: format!("invalid scripted status {}", code),
                }),
            Reply::Failure(description) => Err(TransportError::Request {
                description: description.to_owned(),
            }),
            Reply::Hang => std::future::pending().await,
        }
    }
}

struct Pipeline {
    limiter: ConcurrencyLimiter,
    shutdown_tx: ShutdownSender,
    scheduler: tokio::task::JoinHandle<SchedulerReport>,
    aggregator: tokio::task::JoinHandle<Counters>,
    view: crate::metrics::CountersView,
    drops: crate::metrics::DropCounter,
}

/// Wires scheduler, executor and aggregator the way a client run does. The
/// aggregator stops once every intake handle is gone, so outcomes of calls
/// that finish during the drain are still counted.
fn start_pipeline(
    transport: Arc<ScriptedTransport>,
    concurrency: usize,
    delay: Duration,
) -> AppResult<Pipeline> {
    let config = WorkloadConfig::new(positive(concurrency)?, delay)?;
    let limiter = ConcurrencyLimiter::new(config.concurrent_requests());
    let (intake, receiver) = outcome_intake(config.intake_capacity());
    let drops = intake.drop_counter();
    let sink = MetricsSink::new();
    let view = sink.subscribe();
    let (shutdown_tx, _) = shutdown_channel();
    let (aggregator_shutdown_tx, _) = shutdown_channel();

    let aggregator_rx = aggregator_shutdown_tx.subscribe();
    let aggregator = tokio::spawn(async move {
        let counters = ResultAggregator::new(receiver, sink).run(aggregator_rx).await;
        drop(aggregator_shutdown_tx);
        counters
    });
    let executor = RequestExecutor::new(transport, intake);
    let scheduler = Scheduler::new(config, limiter.clone(), executor, &shutdown_tx);
    let scheduler = tokio::spawn(scheduler.run());

    Ok(Pipeline {
        limiter,
        shutdown_tx,
        scheduler,
        aggregator,
        view,
        drops,
    })
}

/// Totals of a stopped pipeline once every call has finished.
struct Stopped {
    ticks: u64,
    dispatched: u64,
    drained: DrainReport,
    counters: Counters,
    dropped: u64,
}

impl Pipeline {
    async fn stop(self, grace: Duration) -> AppResult<Stopped> {
        self.shutdown_tx
            .send(())
            .map_err(|err| AppError::validation(format!("Failed to send shutdown: {}", err)))?;
        let SchedulerReport {
            ticks,
            dispatched,
            in_flight,
        } = tokio::time::timeout(TEST_TIMEOUT, self.scheduler)
            .await
            .map_err(|err| AppError::validation(format!("Scheduler ignored shutdown: {}", err)))??;
        let drained = tokio::time::timeout(TEST_TIMEOUT, in_flight.drain(grace))
            .await
            .map_err(|err| AppError::validation(format!("Drain hung: {}", err)))?;
        let counters = tokio::time::timeout(TEST_TIMEOUT, self.aggregator)
            .await
            .map_err(|err| AppError::validation(format!("Aggregator hung: {}", err)))??;
        if self.limiter.held() != 0 {
            return Err(AppError::validation(format!(
                "Expected no held permits after drain, found {}",
                self.limiter.held()
            )));
        }
        Ok(Stopped {
            ticks,
            dispatched,
            drained,
            counters,
            dropped: self.drops.get(),
        })
    }
}

#[test]
fn workload_config_rejects_zero_delay() -> AppResult<()> {
    match WorkloadConfig::new(positive(4)?, Duration::ZERO) {
        Err(ValidationError::DurationZero) => {}
        Err(err) => return Err(AppError::validation(format!("Unexpected error: {}", err))),
        Ok(_) => return Err(AppError::validation("Expected zero delay to be rejected")),
    }
    let config = WorkloadConfig::new(positive(4)?, Duration::from_millis(1))?;
    if config.intake_capacity() != 8 {
        return Err(AppError::validation("Intake capacity should be twice concurrency"));
    }
    Ok(())
}

#[test]
fn limiter_tracks_held_and_available() -> AppResult<()> {
    run_async_test(async {
        let limiter = ConcurrencyLimiter::new(positive(2)?);
        let (shutdown_tx, mut shutdown_rx) = shutdown_channel();

        let first = limiter.acquire(&mut shutdown_rx).await?;
        let second = limiter.acquire(&mut shutdown_rx).await?;
        if limiter.held() != 2 || limiter.available() != 0 || limiter.capacity() != 2 {
            return Err(AppError::validation("Expected a full limiter"));
        }

        first.release();
        if limiter.held() != 1 || limiter.available() != 1 {
            return Err(AppError::validation("Release should return one unit"));
        }
        drop(second);
        if limiter.held() != 0 || limiter.available() != 2 {
            return Err(AppError::validation("Drop should return one unit"));
        }
        drop(shutdown_tx);
        Ok(())
    })
}

#[test]
fn limiter_acquire_cancelled_while_waiting() -> AppResult<()> {
    run_async_test(async {
        let limiter = ConcurrencyLimiter::new(positive(1)?);
        let (shutdown_tx, mut shutdown_rx) = shutdown_channel();
        let held = limiter.acquire(&mut shutdown_rx).await?;

        let waiter_limiter = limiter.clone();
        let mut waiter_rx = shutdown_tx.subscribe();
        let waiter =
            tokio::spawn(async move { waiter_limiter.acquire(&mut waiter_rx).await.map(drop) });
        tokio::task::yield_now().await;
        shutdown_tx
            .send(())
            .map_err(|err| AppError::validation(format!("Failed to send shutdown: {}", err)))?;

        let result = tokio::time::timeout(TEST_TIMEOUT, waiter)
            .await
            .map_err(|err| AppError::validation(format!("Acquire ignored shutdown: {}", err)))??;
        if result != Err(Cancelled) {
            return Err(AppError::validation("Expected cancelled acquire"));
        }
        if limiter.held() != 1 {
            return Err(AppError::validation("Cancelled acquire must not grant"));
        }
        drop(held);
        Ok(())
    })
}

#[test]
fn limiter_acquire_cancelled_when_sender_gone() -> AppResult<()> {
    run_async_test(async {
        let limiter = ConcurrencyLimiter::new(positive(3)?);
        let (shutdown_tx, mut shutdown_rx) = shutdown_channel();
        drop(shutdown_tx);
        if limiter.acquire(&mut shutdown_rx).await.is_ok() {
            return Err(AppError::validation("Expected cancellation without a sender"));
        }
        if limiter.held() != 0 {
            return Err(AppError::validation("Nothing should be held"));
        }
        Ok(())
    })
}

#[test]
fn executor_delivers_outcome_then_releases_permit() -> AppResult<()> {
    run_async_test(async {
        let limiter = ConcurrencyLimiter::new(positive(1)?);
        let (shutdown_tx, mut shutdown_rx) = shutdown_channel();
        let (intake, receiver) = outcome_intake(2);
        let transport = ScriptedTransport::new([Step::status(503)], Step::status(200));
        let executor = RequestExecutor::new(Arc::clone(&transport), intake);

        let permit = limiter.acquire(&mut shutdown_rx).await?;
        let delivery = executor.execute(permit).await;
        if delivery != Delivery::Delivered {
            return Err(AppError::validation("Expected delivery"));
        }
        if limiter.held() != 0 {
            return Err(AppError::validation("Permit should be released"));
        }

        drop(executor);
        let counters = ResultAggregator::new(receiver, MetricsSink::new())
            .run(shutdown_tx.subscribe())
            .await;
        if counters.get(503, "Service Unavailable") != 1 || counters.total() != 1 {
            return Err(AppError::validation("Expected one 503 outcome"));
        }
        Ok(())
    })
}

#[test]
fn executor_deadline_becomes_transport_failure() -> AppResult<()> {
    run_async_test(async {
        let limiter = ConcurrencyLimiter::new(positive(1)?);
        let (shutdown_tx, mut shutdown_rx) = shutdown_channel();
        let (intake, receiver) = outcome_intake(2);
        let transport = ScriptedTransport::new([], Step {
            latency: Duration::ZERO,
            reply: Reply::Hang,
        });
        let executor =
            RequestExecutor::new(transport, intake).with_deadline(Duration::from_millis(20));

        let permit = limiter.acquire(&mut shutdown_rx).await?;
        tokio::time::timeout(TEST_TIMEOUT, executor.execute(permit))
            .await
            .map_err(|err| AppError::validation(format!("Deadline never fired: {}", err)))?;
        if limiter.held() != 0 {
            return Err(AppError::validation("Permit should be released after deadline"));
        }

        drop(executor);
        let counters = ResultAggregator::new(receiver, MetricsSink::new())
            .run(shutdown_tx.subscribe())
            .await;
        if counters.get(TRANSPORT_FAILURE_CODE, "request deadline of 20ms exceeded") != 1 {
            return Err(AppError::validation(format!(
                "Expected deadline outcome, got {:?}",
                counters
            )));
        }
        Ok(())
    })
}

#[test]
fn executor_ignores_shutdown_and_counts_the_response() -> AppResult<()> {
    run_async_test(async {
        let limiter = ConcurrencyLimiter::new(positive(1)?);
        let (shutdown_tx, mut shutdown_rx) = shutdown_channel();
        let (intake, receiver) = outcome_intake(2);
        let transport = ScriptedTransport::new([], Step {
            latency: Duration::from_millis(5),
            reply: Reply::Status(200),
        });
        let executor = RequestExecutor::new(Arc::clone(&transport), intake);

        let permit = limiter.acquire(&mut shutdown_rx).await?;
        let task = tokio::spawn(async move { executor.execute(permit).await });
        while transport.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        shutdown_tx
            .send(())
            .map_err(|err| AppError::validation(format!("Failed to send shutdown: {}", err)))?;
        let delivery = tokio::time::timeout(TEST_TIMEOUT, task)
            .await
            .map_err(|err| AppError::validation(format!("Call never finished: {}", err)))??;
        if delivery != Delivery::Delivered || limiter.held() != 0 {
            return Err(AppError::validation("Expected delivered outcome and released permit"));
        }

        let (_aggregator_tx, aggregator_rx) = shutdown_channel();
        let counters = ResultAggregator::new(receiver, MetricsSink::new())
            .run(aggregator_rx)
            .await;
        if counters.get(200, "OK") != 1 || counters.total() != 1 || counters.failures() != 0 {
            return Err(AppError::validation(format!(
                "Expected a single 200 outcome, got {:?}",
                counters
            )));
        }
        Ok(())
    })
}

#[test]
fn shutdown_lets_in_flight_calls_finish_without_failures() -> AppResult<()> {
    run_async_test(async {
        let transport = ScriptedTransport::new([], Step {
            latency: Duration::from_millis(30),
            reply: Reply::Status(200),
        });
        let pipeline = start_pipeline(Arc::clone(&transport), 2, Duration::from_millis(1))?;
        while pipeline.limiter.held() < 2 {
            tokio::task::yield_now().await;
        }

        let stopped = pipeline.stop(Duration::from_secs(1)).await?;
        if stopped.dispatched == 0 || stopped.drained.aborted != 0 {
            return Err(AppError::validation(format!(
                "Expected calls to finish during the drain, got {:?}",
                stopped.drained
            )));
        }
        if stopped.counters.failures() != 0 {
            return Err(AppError::validation(format!(
                "Shutdown turned calls into failures: {:?}",
                stopped.counters
            )));
        }
        let accounted = stopped
            .counters
            .get(200, "OK")
            .saturating_add(stopped.dropped);
        if accounted != stopped.dispatched {
            return Err(AppError::validation(format!(
                "Dispatched {} calls but accounted for {}",
                stopped.dispatched, accounted
            )));
        }
        Ok(())
    })
}

#[test]
fn pipeline_counts_scripted_statuses() -> AppResult<()> {
    run_async_test(async {
        let script = [
            Step::status(200),
            Step::status(200),
            Step::status(503),
            Step::failure("connection refused"),
            Step::status(200),
        ];
        let transport = ScriptedTransport::new(script, Step {
            latency: Duration::ZERO,
            reply: Reply::Hang,
        });
        let mut pipeline = start_pipeline(Arc::clone(&transport), 2, Duration::from_millis(1))?;

        let snapshot = tokio::time::timeout(
            TEST_TIMEOUT,
            pipeline.view.wait_for(|counters| counters.total() == 5),
        )
        .await
        .map_err(|err| AppError::validation(format!("Outcomes never arrived: {}", err)))?
        .ok_or_else(|| AppError::validation("Sink closed early"))?;

        let expected = [
            (200, "OK", 3),
            (503, "Service Unavailable", 1),
            (TRANSPORT_FAILURE_CODE, "connection refused", 1),
        ];
        for (code, label, count) in expected {
            if snapshot.get(code, label) != count {
                return Err(AppError::validation(format!(
                    "Expected {} x ({}, {}), got {:?}",
                    count, code, label, snapshot
                )));
            }
        }

        let stopped = pipeline.stop(Duration::from_millis(50)).await?;
        let aborted = u64::try_from(stopped.drained.aborted).unwrap_or(u64::MAX);
        if stopped.counters.total() != 5 || aborted == 0 {
            return Err(AppError::validation(format!(
                "Hung calls should be aborted uncounted, got {:?} and {:?}",
                stopped.counters, stopped.drained
            )));
        }
        let accounted = stopped
            .counters
            .total()
            .saturating_add(stopped.dropped)
            .saturating_add(aborted);
        if accounted != stopped.dispatched {
            return Err(AppError::validation(format!(
                "Dispatched {} calls but accounted for {}",
                stopped.dispatched, accounted
            )));
        }
        if transport.max_active() > 2 {
            return Err(AppError::validation("Concurrency ceiling exceeded"));
        }
        Ok(())
    })
}

#[test]
fn shutdown_stops_ticks_and_aborts_calls_outlasting_grace() -> AppResult<()> {
    run_async_test(async {
        let delay = Duration::from_millis(20);
        let transport = ScriptedTransport::new([], Step {
            latency: Duration::ZERO,
            reply: Reply::Hang,
        });
        let pipeline = start_pipeline(Arc::clone(&transport), 3, delay)?;
        tokio::time::sleep(delay.saturating_mul(4)).await;

        let started = tokio::time::Instant::now();
        let stopped = pipeline.stop(Duration::from_millis(100)).await?;
        let elapsed = started.elapsed();
        if elapsed > Duration::from_secs(1) {
            return Err(AppError::validation(format!(
                "Shutdown took {:?}",
                elapsed
            )));
        }
        let calls = transport.calls.load(Ordering::SeqCst);
        if calls != stopped.dispatched {
            return Err(AppError::validation(format!(
                "Calls kept starting after shutdown: {} calls, {} dispatched",
                calls, stopped.dispatched
            )));
        }
        if stopped.dispatched > 3 || stopped.ticks < stopped.dispatched {
            return Err(AppError::validation(format!(
                "Unexpected dispatch count {} over {} ticks",
                stopped.dispatched, stopped.ticks
            )));
        }
        let aborted = u64::try_from(stopped.drained.aborted).unwrap_or(u64::MAX);
        if aborted != stopped.dispatched || stopped.drained.completed != 0 {
            return Err(AppError::validation(format!(
                "Every hung call should be aborted, got {:?}",
                stopped.drained
            )));
        }
        if !stopped.counters.is_empty() {
            return Err(AppError::validation(format!(
                "Aborted calls must not be counted, got {:?}",
                stopped.counters
            )));
        }
        Ok(())
    })
}

#[test]
fn detached_calls_still_release_permits() -> AppResult<()> {
    run_async_test(async {
        let transport = ScriptedTransport::new([], Step {
            latency: Duration::from_millis(30),
            reply: Reply::Status(200),
        });
        let pipeline = start_pipeline(Arc::clone(&transport), 2, Duration::from_millis(1))?;
        while pipeline.limiter.held() < 2 {
            tokio::task::yield_now().await;
        }

        let (shutdown_tx, scheduler, limiter) =
            (pipeline.shutdown_tx, pipeline.scheduler, pipeline.limiter);
        shutdown_tx
            .send(())
            .map_err(|err| AppError::validation(format!("Failed to send shutdown: {}", err)))?;
        let report = tokio::time::timeout(TEST_TIMEOUT, scheduler)
            .await
            .map_err(|err| AppError::validation(format!("Scheduler ignored shutdown: {}", err)))??;
        let detached = report.in_flight.detach();
        if detached > 2 {
            return Err(AppError::validation(format!("Detached {} calls", detached)));
        }

        tokio::time::timeout(TEST_TIMEOUT, async {
            while limiter.held() > 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .map_err(|err| AppError::validation(format!("Detached calls leaked permits: {}", err)))?;
        tokio::time::timeout(TEST_TIMEOUT, pipeline.aggregator)
            .await
            .map_err(|err| AppError::validation(format!("Aggregator hung: {}", err)))??;
        Ok(())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Held permits never exceed the ceiling, and every dispatched call is
    /// either counted or counted as dropped once the run quiesces.
    #[test]
    fn held_permits_bounded_under_random_timing(
        concurrency in 1usize..5,
        tick_micros in 200u64..2_000,
        steps in prop::collection::vec((0u64..4, prop::bool::ANY), 1..40),
    ) {
        let script: Vec<Step> = steps
            .iter()
            .map(|(latency_ms, ok)| Step {
                latency: Duration::from_millis(*latency_ms),
                reply: if *ok { Reply::Status(200) } else { Reply::Failure("reset by peer") },
            })
            .collect();
        let scripted = script.len();
        let outcome = run_async_test(async move {
            let transport = ScriptedTransport::new(script, Step::status(204));
            let mut pipeline = start_pipeline(
                Arc::clone(&transport),
                concurrency,
                Duration::from_micros(tick_micros),
            )?;
            let target = u64::try_from(scripted).unwrap_or(u64::MAX);
            let drops = pipeline.drops.clone();
            tokio::time::timeout(
                TEST_TIMEOUT,
                pipeline
                    .view
                    .wait_for(|counters| counters.total().saturating_add(drops.get()) >= target),
            )
            .await
            .map_err(|err| AppError::validation(format!("Run stalled: {}", err)))?;

            let stopped = pipeline.stop(Duration::from_secs(1)).await?;
            if transport.max_active() > concurrency {
                return Err(AppError::validation(format!(
                    "Observed {} concurrent calls with ceiling {}",
                    transport.max_active(),
                    concurrency
                )));
            }
            if stopped.counters.total().saturating_add(stopped.dropped) != stopped.dispatched {
                return Err(AppError::validation("Dispatched calls went unaccounted"));
            }
            Ok(())
        });
        prop_assert!(outcome.is_ok(), "{:?}", outcome.err());
    }
}
