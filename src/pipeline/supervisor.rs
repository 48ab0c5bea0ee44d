//! Supervisor - owns the run from start to shutdown
//!
//! The supervisor is responsible for:
//! - Creating the queue, the throttle state and the cancellation token
//! - Starting the resource monitor and quit listener before any producer
//! - Spawning the workers
//! - Running the collector on the calling thread
//! - Cancelling and joining every component, then aggregating statistics

use crate::config::HuntConfig;
use crate::entropy::EntropySource;
use crate::error::{Result, WorkerError};
use crate::mnemonic::MnemonicEncoder;
use crate::pipeline::cancel::{CancellationToken, QuitListener};
use crate::pipeline::collector::{
    Collector, CollectorTimings, ResultLedger, SelectionPolicy, StopReason,
};
use crate::pipeline::monitor::{MonitorHandle, ResourceMonitor, UsageSampler};
use crate::pipeline::queue::CandidateQueue;
use crate::pipeline::throttle::ThrottleState;
use crate::pipeline::worker::{aggregate_stats, Worker, WorkerContext};
use crate::progress::ProgressReporter;
use crate::sink::ResultSink;
use std::io::BufRead;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct HuntReport {
    /// Candidates the collector dequeued
    pub processed: u64,

    /// Phrases accepted into the ledger
    pub accepted: usize,

    /// Final ledger
    pub ledger: ResultLedger,

    /// Records the sink failed to write
    pub sink_errors: u64,

    /// Candidates dropped on a full queue
    pub dropped: u64,

    /// Blocks the encoder rejected
    pub encode_failures: u64,

    /// Failed or short entropy requests
    pub entropy_failures: u64,

    /// Wall time of the run
    pub duration: Duration,

    /// What ended the run
    pub cancelled_by: StopReason,
}

/// Coordinates the producers, the monitor and the collector
pub struct Supervisor {
    config: Arc<HuntConfig>,
    source: Arc<dyn EntropySource>,
    encoder: Arc<dyn MnemonicEncoder>,
    sink: Box<dyn ResultSink>,
    sampler: Box<dyn UsageSampler>,
    quit_input: Option<Box<dyn BufRead + Send>>,
    token: CancellationToken,
}

impl Supervisor {
    pub fn new(
        config: HuntConfig,
        source: Arc<dyn EntropySource>,
        encoder: Arc<dyn MnemonicEncoder>,
        sink: Box<dyn ResultSink>,
        sampler: Box<dyn UsageSampler>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            source,
            encoder,
            sink,
            sampler,
            quit_input: None,
            token: CancellationToken::new(),
        }
    }

    /// Read quit requests from this input instead of stdin
    pub fn with_quit_input(mut self, input: impl BufRead + Send + 'static) -> Self {
        self.quit_input = Some(Box::new(input));
        self
    }

    /// Get a clone of the cancellation token (for signal handlers)
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Run until a stop trigger fires, then shut everything down
    pub fn run(self, reporter: ProgressReporter) -> Result<HuntReport> {
        self.config.validate()?;
        let Supervisor {
            config,
            source,
            encoder,
            sink,
            sampler,
            quit_input,
            token,
        } = self;
        let start = Instant::now();

        let queue = CandidateQueue::new(config.queue_capacity);
        let queue_stats = queue.stats();
        let (throttle, publisher) = ThrottleState::pair();

        // Monitor and listener first so throttling and stop detection are
        // live before any producer runs
        let monitor = match ResourceMonitor::spawn(
            sampler,
            publisher,
            token.clone(),
            config.monitor_interval,
            config.resource_budget,
        ) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Running without resource monitor");
                None
            }
        };

        let listener = if config.listen_for_quit {
            let spawned = match quit_input {
                Some(input) => QuitListener::spawn(input, token.clone(), config.listener_poll),
                None => QuitListener::spawn_stdin(token.clone(), config.listener_poll),
            };
            match spawned {
                Ok(listener) => Some(listener),
                Err(e) => {
                    warn!(error = %e, "Keyboard quit listener unavailable");
                    None
                }
            }
        } else {
            None
        };

        let ctx = WorkerContext {
            config: Arc::clone(&config),
            source,
            encoder,
            producer: queue.producer(),
            throttle: throttle.clone(),
            token: token.clone(),
        };
        let workers = spawn_workers(&ctx, config.worker_count);
        // Only the workers may hold producers, so the collector sees Closed
        // once all of them are gone
        drop(ctx);

        if workers.is_empty() {
            error!("No workers could be started");
            token.cancel();
            shutdown_background(monitor, listener);
            return Err(WorkerError::NoWorkers.into());
        }
        info!(workers = workers.len(), "Workers started");

        let collector = Collector::new(
            queue.into_consumer(),
            SelectionPolicy::from_config(&config),
            sink,
            reporter,
            throttle,
            token.clone(),
            CollectorTimings::from_config(&config),
        );
        let collected = collector.run();

        // Collector is done for whatever reason; everyone else stops too
        token.cancel();
        let stats: Vec<_> = workers.iter().map(Worker::stats_handle).collect();
        for worker in workers {
            let id = worker.id();
            if let Err(e) = worker.join() {
                error!(worker = id, error = %e, "Worker failed");
            }
        }
        shutdown_background(monitor, listener);

        let totals = aggregate_stats(&stats);
        let duration = start.elapsed();
        debug!(
            enqueued = queue_stats.enqueued.load(Ordering::Relaxed),
            dequeued = queue_stats.dequeued.load(Ordering::Relaxed),
            dropped = queue_stats.dropped_count(),
            "Queue totals"
        );
        info!(
            processed = collected.processed,
            accepted = collected.ledger.total(),
            generated = totals.generated,
            dropped = totals.dropped,
            duration_secs = duration.as_secs(),
            "Hunt finished"
        );

        Ok(HuntReport {
            processed: collected.processed,
            accepted: collected.ledger.total(),
            ledger: collected.ledger,
            sink_errors: collected.sink_errors,
            dropped: totals.dropped,
            encode_failures: totals.encode_failures,
            entropy_failures: totals.entropy_failures,
            duration,
            cancelled_by: collected.stop,
        })
    }
}

/// Spawn up to `count` workers; failures are logged and skipped
fn spawn_workers(ctx: &WorkerContext, count: usize) -> Vec<Worker> {
    let mut workers = Vec::with_capacity(count);
    for id in 0..count {
        match Worker::spawn(id, ctx.clone()) {
            Ok(worker) => workers.push(worker),
            Err(e) => warn!(worker = id, error = %e, "Failed to start worker"),
        }
    }
    workers
}

/// Join the monitor and listener. The token must already be cancelled.
fn shutdown_background(monitor: Option<MonitorHandle>, listener: Option<QuitListener>) {
    if let Some(monitor) = monitor {
        if let Err(e) = monitor.join() {
            warn!(error = %e, "Resource monitor did not stop cleanly");
        }
    }
    if let Some(listener) = listener {
        if listener.join().is_err() {
            warn!("Quit listener panicked");
        }
    }
    debug!("Background components stopped");
}
