//! The single consumer
//!
//! Dequeues candidates, applies the selection policy against the ledger and
//! emits accepted results to the log sink and the display. The ledger is owned
//! here and never shared, so it needs no synchronization.

use crate::config::HuntConfig;
use crate::pipeline::cancel::CancellationToken;
use crate::pipeline::queue::{Candidate, DequeueOutcome, QueueConsumer};
use crate::pipeline::throttle::ThrottleReader;
use crate::progress::{ProgressReporter, StatusLine};
use crate::sink::ResultSink;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};

/// Acceptance tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPolicy {
    /// Accept only metric < this
    pub acceptance_threshold: usize,

    /// Metric <= this has no per-metric cap
    pub unlimited_threshold: usize,

    /// Per-metric cap above the unlimited tier
    pub cap_per_metric: usize,
}

impl SelectionPolicy {
    pub fn new(acceptance_threshold: usize, unlimited_threshold: usize, cap_per_metric: usize) -> Self {
        Self {
            acceptance_threshold,
            unlimited_threshold,
            cap_per_metric,
        }
    }

    pub fn from_config(config: &HuntConfig) -> Self {
        Self::new(
            config.acceptance_threshold,
            config.unlimited_threshold,
            config.cap_per_metric,
        )
    }

    /// Whether a metric falls in the capped tier
    pub fn is_capped(&self, metric: usize) -> bool {
        metric > self.unlimited_threshold
    }
}

/// Outcome of offering a candidate to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// New phrase, recorded
    Accepted,
    /// Metric at or above the acceptance threshold
    AboveThreshold,
    /// Phrase already recorded for this metric
    Duplicate,
    /// Capped tier already full for this metric
    CapReached,
}

/// Accepted phrases grouped by metric
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultLedger {
    by_metric: BTreeMap<usize, HashSet<String>>,
    total: usize,
}

impl ResultLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the policy and record the phrase if it is accepted
    pub fn offer(&mut self, policy: &SelectionPolicy, candidate: &Candidate) -> Verdict {
        let metric = candidate.metric;
        if metric >= policy.acceptance_threshold {
            return Verdict::AboveThreshold;
        }

        if let Some(phrases) = self.by_metric.get(&metric) {
            if phrases.contains(&candidate.phrase) {
                return Verdict::Duplicate;
            }
            if policy.is_capped(metric) && phrases.len() >= policy.cap_per_metric {
                return Verdict::CapReached;
            }
        } else if policy.is_capped(metric) && policy.cap_per_metric == 0 {
            return Verdict::CapReached;
        }

        self.by_metric
            .entry(metric)
            .or_default()
            .insert(candidate.phrase.clone());
        self.total += 1;
        Verdict::Accepted
    }

    pub fn contains(&self, metric: usize, phrase: &str) -> bool {
        self.by_metric
            .get(&metric)
            .is_some_and(|phrases| phrases.contains(phrase))
    }

    /// Phrases recorded for one metric
    pub fn count_for(&self, metric: usize) -> usize {
        self.by_metric.get(&metric).map_or(0, HashSet::len)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// (metric, count) pairs in ascending metric order
    pub fn counts(&self) -> Vec<(usize, usize)> {
        self.by_metric
            .iter()
            .map(|(metric, phrases)| (*metric, phrases.len()))
            .collect()
    }

    /// Every entry ordered by metric, then phrase
    pub fn sorted_entries(&self) -> Vec<(usize, &str)> {
        let mut entries = Vec::with_capacity(self.total);
        for (metric, phrases) in &self.by_metric {
            let mut sorted: Vec<&str> = phrases.iter().map(String::as_str).collect();
            sorted.sort_unstable();
            entries.extend(sorted.into_iter().map(|p| (*metric, p)));
        }
        entries
    }
}

/// One accepted candidate, as written to the sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedRecord {
    pub phrase: String,
    pub metric: usize,

    /// Candidates processed so far, this one included
    pub iteration: u64,

    /// Time since the collector started
    pub elapsed: Duration,
}

/// Why the collector stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Cancellation token set (Ctrl-C, keyboard, caller)
    Cancelled,
    /// Configured run time elapsed
    Deadline,
    /// Every producer exited
    ProducersGone,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::Deadline => write!(f, "time limit reached"),
            StopReason::ProducersGone => write!(f, "all workers exited"),
        }
    }
}

/// Collector pacing
#[derive(Debug, Clone, Copy)]
pub struct CollectorTimings {
    pub dequeue_timeout: Duration,
    pub status_interval: Duration,

    /// Consecutive empty dequeues per "waiting" notice; 0 disables it
    pub idle_notice_after: u64,

    pub max_runtime: Option<Duration>,
}

impl CollectorTimings {
    pub fn from_config(config: &HuntConfig) -> Self {
        Self {
            dequeue_timeout: config.dequeue_timeout,
            status_interval: config.status_interval,
            idle_notice_after: config.idle_notice_after,
            max_runtime: config.max_runtime,
        }
    }
}

/// What the collector saw over the run
#[derive(Debug, Clone)]
pub struct CollectorReport {
    pub processed: u64,
    pub ledger: ResultLedger,
    pub sink_errors: u64,
    pub elapsed: Duration,
    pub stop: StopReason,
}

/// The consumer loop and its state
pub struct Collector {
    consumer: QueueConsumer,
    policy: SelectionPolicy,
    ledger: ResultLedger,
    sink: Box<dyn ResultSink>,
    reporter: ProgressReporter,
    throttle: ThrottleReader,
    token: CancellationToken,
    timings: CollectorTimings,

    processed: u64,
    idle: u64,
    idle_notices: u64,
    sink_errors: u64,
    started: Instant,
    last_status: Instant,
}

impl Collector {
    pub fn new(
        consumer: QueueConsumer,
        policy: SelectionPolicy,
        sink: Box<dyn ResultSink>,
        reporter: ProgressReporter,
        throttle: ThrottleReader,
        token: CancellationToken,
        timings: CollectorTimings,
    ) -> Self {
        let now = Instant::now();
        Self {
            consumer,
            policy,
            ledger: ResultLedger::new(),
            sink,
            reporter,
            throttle,
            token,
            timings,
            processed: 0,
            idle: 0,
            idle_notices: 0,
            sink_errors: 0,
            started: now,
            last_status: now,
        }
    }

    /// Count one candidate and apply the policy to it
    pub fn process(&mut self, candidate: Candidate) -> Verdict {
        self.processed += 1;
        self.idle = 0;

        let verdict = self.ledger.offer(&self.policy, &candidate);
        match verdict {
            Verdict::Accepted => {
                let record = AcceptedRecord {
                    phrase: candidate.phrase,
                    metric: candidate.metric,
                    iteration: self.processed,
                    elapsed: self.started.elapsed(),
                };
                debug!(metric = record.metric, iteration = record.iteration, "Accepted");
                self.reporter.announce(&record);

                if let Err(e) = self.sink.append(&record) {
                    self.sink_errors += 1;
                    error!(error = %e, "Failed to write accepted phrase to log");
                    self.reporter.notice(&format!("Log write failed: {}", e));
                }
            }
            other => trace!(metric = candidate.metric, verdict = ?other, "Rejected"),
        }

        verdict
    }

    /// Run until cancelled, the deadline passes or every producer is gone
    pub fn run(mut self) -> CollectorReport {
        let deadline = self.timings.max_runtime.map(|d| self.started + d);
        info!("Collector starting");

        let stop = loop {
            if self.token.is_cancelled() {
                break StopReason::Cancelled;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                info!("Run time limit reached");
                self.token.cancel();
                break StopReason::Deadline;
            }

            match self.consumer.dequeue(self.timings.dequeue_timeout) {
                DequeueOutcome::Item(candidate) => {
                    self.process(candidate);
                }
                DequeueOutcome::Empty => self.record_idle(),
                DequeueOutcome::Closed => {
                    // Workers drop their producers on cancel, so a stop that
                    // lands mid-dequeue also shows up as Closed
                    if self.token.is_cancelled() {
                        break StopReason::Cancelled;
                    }
                    info!("All producers exited");
                    break StopReason::ProducersGone;
                }
            }

            self.maybe_report_status();
        };

        self.report_status();
        info!(
            processed = self.processed,
            accepted = self.ledger.total(),
            idle_notices = self.idle_notices,
            reason = %stop,
            "Collector stopped"
        );

        CollectorReport {
            processed: self.processed,
            ledger: self.ledger,
            sink_errors: self.sink_errors,
            elapsed: self.started.elapsed(),
            stop,
        }
    }

    fn record_idle(&mut self) {
        self.idle += 1;
        let every = self.timings.idle_notice_after;
        if every > 0 && self.idle % every == 0 {
            self.idle_notices += 1;
            debug!(idle = self.idle, "Queue idle");
            self.reporter.notice("Waiting for data from workers...");
        }
    }

    fn maybe_report_status(&mut self) {
        if self.last_status.elapsed() >= self.timings.status_interval {
            self.report_status();
        }
    }

    fn report_status(&mut self) {
        let line = StatusLine {
            processed: self.processed,
            elapsed: self.started.elapsed(),
            throttle: self.throttle.snapshot(),
        };
        self.reporter.update(&line);
        self.last_status = Instant::now();
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn ledger(&self) -> &ResultLedger {
        &self.ledger
    }

    pub fn sink_errors(&self) -> u64 {
        self.sink_errors
    }
}
