//! Producer threads
//!
//! Each worker loops through four steps until cancelled:
//! - adjust its batch size from the queue fill ratio (halve and back off when
//!   the queue is near full, double when it drains)
//! - apply the current throttle factor (sleep proportionally, shrink the batch)
//! - pull a batch of entropy blocks from the source
//! - encode each block, measure it and try to enqueue it; the first full
//!   enqueue abandons the rest of the batch

use crate::config::HuntConfig;
use crate::entropy::EntropySource;
use crate::error::{EntropyError, WorkerError};
use crate::mnemonic::{letter_count, MnemonicEncoder};
use crate::pipeline::cancel::CancellationToken;
use crate::pipeline::queue::{Candidate, EnqueueOutcome, QueueProducer};
use crate::pipeline::throttle::ThrottleReader;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Adaptive batch sizing driven by queue occupancy
#[derive(Debug, Clone)]
pub struct BatchController {
    max: usize,
    min: usize,
    current: usize,
    consecutive_full: u32,
    high_water: f64,
    base_delay: Duration,
}

impl BatchController {
    /// Start at the maximum batch size
    pub fn new(max: usize, min: usize, high_water: f64, base_delay: Duration) -> Self {
        let max = max.max(1);
        Self {
            max,
            min: min.clamp(1, max),
            current: max,
            consecutive_full: 0,
            high_water,
            base_delay,
        }
    }

    pub fn from_config(config: &HuntConfig) -> Self {
        Self::new(
            config.batch_size,
            config.min_batch_size,
            config.high_water,
            config.worker_delay,
        )
    }

    /// Update the batch size for the observed occupancy ratio
    ///
    /// At or above the high-water mark the batch is halved (not below the
    /// minimum) and a backoff grows linearly with the number of consecutive
    /// saturated observations. Below it the batch doubles (not above the
    /// maximum) and no backoff is returned.
    pub fn adjust(&mut self, occupancy: f64) -> Option<Duration> {
        if occupancy >= self.high_water {
            self.consecutive_full = self.consecutive_full.saturating_add(1);
            self.current = (self.current / 2).max(self.min);
            Some(self.base_delay.saturating_mul(self.consecutive_full))
        } else {
            self.consecutive_full = 0;
            self.current = self.current.saturating_mul(2).min(self.max);
            None
        }
    }

    /// Blocks to request this iteration for a throttle factor in (0, 1]
    pub fn generate_count(&self, factor: f64) -> usize {
        let scaled = (self.current as f64 * factor).floor() as usize;
        scaled.max(self.min)
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn consecutive_full(&self) -> u32 {
        self.consecutive_full
    }
}

/// Throttle factor cached on its own cadence
///
/// The factor is re-read from the shared state at most once per interval,
/// independent of how often the batch size is adjusted.
pub struct ThrottleGate {
    reader: ThrottleReader,
    interval: Duration,
    last_check: Option<Instant>,
    factor: f64,
}

impl ThrottleGate {
    pub fn new(reader: ThrottleReader, interval: Duration) -> Self {
        Self {
            reader,
            interval,
            last_check: None,
            factor: 1.0,
        }
    }

    /// Effective factor, refreshed if the cached one is older than the interval
    pub fn factor(&mut self) -> f64 {
        let now = Instant::now();
        let due = match self.last_check {
            Some(last) => now.duration_since(last) >= self.interval,
            None => true,
        };
        if due {
            self.factor = self.reader.effective_factor();
            self.last_check = Some(now);
        }
        self.factor
    }

    /// Sleep owed for a factor: `base * (1 - factor)`
    pub fn delay(factor: f64, base: Duration) -> Duration {
        if factor >= 1.0 {
            Duration::ZERO
        } else {
            base.mul_f64((1.0 - factor).clamp(0.0, 1.0))
        }
    }
}

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Batches requested from the entropy source
    pub batches: AtomicU64,

    /// Entropy blocks received
    pub generated: AtomicU64,

    /// Candidates accepted by the queue
    pub enqueued: AtomicU64,

    /// Candidates dropped on a full queue
    pub dropped: AtomicU64,

    /// Blocks the encoder rejected
    pub encode_failures: AtomicU64,

    /// Failed entropy requests
    pub entropy_failures: AtomicU64,
}

impl WorkerStats {
    fn record_batch(&self, blocks: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.generated.fetch_add(blocks as u64, Ordering::Relaxed);
    }

    fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_encode_failure(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_entropy_failure(&self) {
        self.entropy_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Plain totals across workers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerTotals {
    pub batches: u64,
    pub generated: u64,
    pub enqueued: u64,
    pub dropped: u64,
    pub encode_failures: u64,
    pub entropy_failures: u64,
}

/// Everything a worker needs, shared or cloned per worker
#[derive(Clone)]
pub struct WorkerContext {
    pub config: Arc<HuntConfig>,
    pub source: Arc<dyn EntropySource>,
    pub encoder: Arc<dyn MnemonicEncoder>,
    pub producer: QueueProducer,
    pub throttle: ThrottleReader,
    pub token: CancellationToken,
}

/// A producer thread
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Thread handle
    handle: Option<JoinHandle<Result<(), WorkerError>>>,

    /// Worker statistics
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn(id: usize, ctx: WorkerContext) -> Result<Self, WorkerError> {
        let stats = Arc::new(WorkerStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("producer-{}", id))
            .spawn(move || worker_loop(id, ctx, stats_clone))
            .map_err(|e| WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Shared handle to the statistics, valid after `join`
    pub fn stats_handle(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    pub fn is_finished(&self) -> bool {
        match self.handle.as_ref() {
            Some(handle) => handle.is_finished(),
            None => true,
        }
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(result) => result,
                Err(panic) => Err(WorkerError::Panicked {
                    id: self.id,
                    message: panic_message(panic.as_ref()),
                }),
            }
        } else {
            Ok(())
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Worker thread panicked".into()
    }
}

/// Main worker loop
fn worker_loop(id: usize, ctx: WorkerContext, stats: Arc<WorkerStats>) -> Result<(), WorkerError> {
    let WorkerContext {
        config,
        source,
        encoder,
        producer,
        throttle,
        token,
    } = ctx;

    let mut batch = BatchController::from_config(&config);
    let mut gate = ThrottleGate::new(throttle, config.throttle_check_interval);

    info!(worker = id, source = source.name(), batch = batch.current(), "Worker starting");

    'run: while !token.is_cancelled() {
        // ADJUST_BATCH
        if let Some(backoff) = batch.adjust(producer.occupancy()) {
            trace!(
                worker = id,
                batch = batch.current(),
                streak = batch.consecutive_full(),
                "Queue saturated, backing off"
            );
            if !token.sleep(backoff) {
                break;
            }
        }

        // CHECK_THROTTLE
        let factor = gate.factor();
        let delay = ThrottleGate::delay(factor, config.throttle_delay_base);
        if !delay.is_zero() {
            trace!(worker = id, factor = factor, "Throttled");
            if !token.sleep(delay) {
                break;
            }
        }

        // GENERATE
        let count = batch.generate_count(factor);
        let blocks = match source.generate(count) {
            Ok(blocks) if blocks.len() < count => {
                let short = EntropyError::ShortBatch {
                    backend: source.name().to_string(),
                    requested: count,
                    got: blocks.len(),
                };
                stats.record_entropy_failure();
                debug!(worker = id, error = %short, "Publishing partial batch");
                blocks
            }
            Ok(blocks) => blocks,
            Err(e) => {
                stats.record_entropy_failure();
                if e.is_recoverable() {
                    debug!(worker = id, error = %e, "Entropy request failed, retrying");
                } else {
                    warn!(worker = id, error = %e, "Entropy source error, retrying");
                }
                token.sleep(config.worker_delay);
                continue;
            }
        };
        stats.record_batch(blocks.len());

        // ENCODE_AND_PUBLISH
        for block in &blocks {
            if token.is_cancelled() {
                break 'run;
            }

            let phrase = match encoder.encode(block) {
                Ok(phrase) => phrase,
                Err(e) => {
                    stats.record_encode_failure();
                    trace!(worker = id, error = %e, "Skipping block");
                    continue;
                }
            };
            let metric = letter_count(&phrase);

            match producer.try_enqueue(Candidate::new(phrase, metric)) {
                EnqueueOutcome::Enqueued => stats.record_enqueued(),
                EnqueueOutcome::Full => {
                    stats.record_dropped();
                    token.sleep(config.worker_delay);
                    break;
                }
                EnqueueOutcome::Closed => {
                    debug!(worker = id, "Queue closed");
                    break 'run;
                }
            }
        }
    }

    info!(
        worker = id,
        generated = stats.generated.load(Ordering::Relaxed),
        enqueued = stats.enqueued.load(Ordering::Relaxed),
        dropped = stats.dropped.load(Ordering::Relaxed),
        "Worker shutting down"
    );

    Ok(())
}

/// Aggregate statistics from multiple workers
pub fn aggregate_stats(stats: &[Arc<WorkerStats>]) -> WorkerTotals {
    stats.iter().fold(WorkerTotals::default(), |acc, s| WorkerTotals {
        batches: acc.batches + s.batches.load(Ordering::Relaxed),
        generated: acc.generated + s.generated.load(Ordering::Relaxed),
        enqueued: acc.enqueued + s.enqueued.load(Ordering::Relaxed),
        dropped: acc.dropped + s.dropped.load(Ordering::Relaxed),
        encode_failures: acc.encode_failures + s.encode_failures.load(Ordering::Relaxed),
        entropy_failures: acc.entropy_failures + s.entropy_failures.load(Ordering::Relaxed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::{EntropyBlock, SeededEntropySource};
    use crate::error::{EncodeError, EntropyError};
    use crate::mnemonic::Bip39Encoder;
    use crate::pipeline::queue::{CandidateQueue, DequeueOutcome};
    use crate::pipeline::throttle::{ThrottleSnapshot, ThrottleState};

    const DELAY: Duration = Duration::from_millis(10);

    fn fast_config() -> HuntConfig {
        HuntConfig {
            batch_size: 64,
            min_batch_size: 8,
            worker_delay: Duration::from_millis(1),
            throttle_check_interval: Duration::from_millis(1),
            throttle_delay_base: Duration::from_millis(1),
            ..HuntConfig::default()
        }
    }

    fn context(
        config: HuntConfig,
        source: Arc<dyn EntropySource>,
        encoder: Arc<dyn MnemonicEncoder>,
        queue: &CandidateQueue,
    ) -> (WorkerContext, CancellationToken) {
        let token = CancellationToken::new();
        let (reader, _publisher) = ThrottleState::pair();
        let ctx = WorkerContext {
            config: Arc::new(config),
            source,
            encoder,
            producer: queue.producer(),
            throttle: reader,
            token: token.clone(),
        };
        (ctx, token)
    }

    fn join_within(worker: Worker, timeout: Duration) -> Result<(), WorkerError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            let _ = tx.send(worker.join());
        });
        rx.recv_timeout(timeout).expect("worker did not stop in time")
    }

    struct FailingSource;

    impl EntropySource for FailingSource {
        fn generate(&self, _count: usize) -> Result<Vec<EntropyBlock>, EntropyError> {
            Err(EntropyError::Unavailable {
                backend: "test".into(),
                reason: "offline".into(),
            })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    /// Hands out half of every request
    struct ShortSource(SeededEntropySource);

    impl EntropySource for ShortSource {
        fn generate(&self, count: usize) -> Result<Vec<EntropyBlock>, EntropyError> {
            self.0.generate(count / 2)
        }

        fn name(&self) -> &str {
            "short"
        }
    }

    /// Rejects every block whose first byte is odd
    struct PickyEncoder;

    impl MnemonicEncoder for PickyEncoder {
        fn encode(&self, block: &[u8]) -> Result<String, EncodeError> {
            if block[0] % 2 == 1 {
                Err(EncodeError::Rejected("odd".into()))
            } else {
                Ok("even".into())
            }
        }
    }

    #[test]
    fn test_batch_halves_when_saturated() {
        let mut batch = BatchController::new(2048, 512, 0.9, DELAY);
        assert_eq!(batch.current(), 2048);

        let previous = batch.current();
        assert!(batch.adjust(0.9).is_some());
        assert!(batch.current() <= previous / 2);

        for _ in 0..10 {
            let previous = batch.current();
            batch.adjust(0.95);
            assert!(batch.current() <= (previous / 2).max(512));
            assert!(batch.current() >= 512);
        }
        assert_eq!(batch.current(), 512);
    }

    #[test]
    fn test_backoff_grows_linearly_and_resets() {
        let mut batch = BatchController::new(2048, 512, 0.9, DELAY);
        assert_eq!(batch.adjust(1.0), Some(DELAY));
        assert_eq!(batch.adjust(1.0), Some(DELAY * 2));
        assert_eq!(batch.adjust(0.99), Some(DELAY * 3));

        assert_eq!(batch.adjust(0.5), None);
        assert_eq!(batch.consecutive_full(), 0);
        assert_eq!(batch.adjust(0.92), Some(DELAY));
    }

    #[test]
    fn test_batch_doubles_up_to_max() {
        let mut batch = BatchController::new(2048, 512, 0.9, DELAY);
        for _ in 0..3 {
            batch.adjust(1.0);
        }
        assert_eq!(batch.current(), 512);

        batch.adjust(0.1);
        assert_eq!(batch.current(), 1024);
        batch.adjust(0.1);
        batch.adjust(0.1);
        assert_eq!(batch.current(), 2048);
    }

    #[test]
    fn test_generate_count_scales_with_factor() {
        let batch = BatchController::new(2048, 512, 0.9, DELAY);
        assert_eq!(batch.generate_count(1.0), 2048);
        assert_eq!(batch.generate_count(0.5), 1024);
        assert_eq!(batch.generate_count(0.8 / 0.95), 1724);
        assert_eq!(batch.generate_count(0.01), 512);
    }

    #[test]
    fn test_min_above_max_is_clamped() {
        let mut batch = BatchController::new(100, 500, 0.9, DELAY);
        batch.adjust(1.0);
        assert_eq!(batch.current(), 100);
        assert_eq!(batch.generate_count(0.1), 100);
    }

    #[test]
    fn test_throttle_delay() {
        let base = Duration::from_millis(50);
        assert_eq!(ThrottleGate::delay(1.0, base), Duration::ZERO);
        let half = ThrottleGate::delay(0.5, base);
        assert!((half.as_secs_f64() - 0.025).abs() < 1e-6);
    }

    #[test]
    fn test_gate_caches_between_checks() {
        let (reader, publisher) = ThrottleState::pair();
        let mut gate = ThrottleGate::new(reader, Duration::from_secs(3600));
        assert_eq!(gate.factor(), 1.0);

        publisher.publish(ThrottleSnapshot {
            cpu_throttle: 0.5,
            ..ThrottleSnapshot::unthrottled()
        });
        // Still cached
        assert_eq!(gate.factor(), 1.0);

        let (reader, publisher) = ThrottleState::pair();
        let mut gate = ThrottleGate::new(reader, Duration::ZERO);
        publisher.publish(ThrottleSnapshot {
            gpu_throttle: 0.25,
            ..ThrottleSnapshot::unthrottled()
        });
        assert_eq!(gate.factor(), 0.25);
    }

    #[test]
    fn test_worker_produces_and_stops() {
        let queue = CandidateQueue::new(1024);
        let consumer = queue.consumer();
        let (ctx, token) = context(
            fast_config(),
            Arc::new(SeededEntropySource::new(7)),
            Arc::new(Bip39Encoder::english()),
            &queue,
        );

        let worker = Worker::spawn(0, ctx).unwrap();
        let first = consumer.dequeue(Duration::from_secs(2));
        match first {
            DequeueOutcome::Item(candidate) => {
                assert_eq!(candidate.phrase.split(' ').count(), 12);
                assert_eq!(candidate.metric, letter_count(&candidate.phrase));
            }
            other => panic!("expected a candidate, got {:?}", other),
        }

        token.cancel();
        let stats = worker.stats_handle();
        join_within(worker, Duration::from_secs(2)).unwrap();
        assert!(stats.enqueued.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn test_worker_backs_off_on_full_queue() {
        let queue = CandidateQueue::new(16);
        let (ctx, token) = context(
            fast_config(),
            Arc::new(SeededEntropySource::new(1)),
            Arc::new(Bip39Encoder::english()),
            &queue,
        );

        let worker = Worker::spawn(0, ctx).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(queue.len() <= 16);

        token.cancel();
        let stats = worker.stats_handle();
        join_within(worker, Duration::from_secs(2)).unwrap();
        assert_eq!(stats.enqueued.load(Ordering::Relaxed), 16);
        assert!(stats.dropped.load(Ordering::Relaxed) >= 1);
    }

    #[test]
    fn test_worker_survives_entropy_failures() {
        let queue = CandidateQueue::new(16);
        let (ctx, token) = context(
            fast_config(),
            Arc::new(FailingSource),
            Arc::new(Bip39Encoder::english()),
            &queue,
        );

        let worker = Worker::spawn(3, ctx).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert!(!worker.is_finished());

        token.cancel();
        let stats = worker.stats_handle();
        join_within(worker, Duration::from_secs(2)).unwrap();
        assert!(stats.entropy_failures.load(Ordering::Relaxed) >= 2);
        assert_eq!(stats.enqueued.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_worker_publishes_short_batches() {
        let queue = CandidateQueue::new(100_000);
        let (ctx, token) = context(
            fast_config(),
            Arc::new(ShortSource(SeededEntropySource::new(9))),
            Arc::new(Bip39Encoder::english()),
            &queue,
        );

        let worker = Worker::spawn(0, ctx).unwrap();
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        let stats = worker.stats_handle();
        join_within(worker, Duration::from_secs(2)).unwrap();

        assert!(stats.entropy_failures.load(Ordering::Relaxed) > 0);
        assert!(stats.enqueued.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn test_worker_skips_encode_failures() {
        let queue = CandidateQueue::new(100_000);
        let (ctx, token) = context(
            fast_config(),
            Arc::new(SeededEntropySource::new(5)),
            Arc::new(PickyEncoder),
            &queue,
        );

        let worker = Worker::spawn(0, ctx).unwrap();
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        let stats = worker.stats_handle();
        join_within(worker, Duration::from_secs(2)).unwrap();

        assert!(stats.encode_failures.load(Ordering::Relaxed) > 0);
        assert!(stats.enqueued.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn test_worker_exits_when_consumer_gone() {
        let queue = CandidateQueue::new(16);
        let (ctx, _token) = context(
            fast_config(),
            Arc::new(SeededEntropySource::new(2)),
            Arc::new(Bip39Encoder::english()),
            &queue,
        );
        drop(queue);

        let worker = Worker::spawn(0, ctx).unwrap();
        join_within(worker, Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_aggregate_stats() {
        let a = Arc::new(WorkerStats::default());
        let b = Arc::new(WorkerStats::default());
        a.record_batch(10);
        b.record_batch(5);
        a.record_dropped();
        b.record_encode_failure();

        let totals = aggregate_stats(&[a, b]);
        assert_eq!(totals.batches, 2);
        assert_eq!(totals.generated, 15);
        assert_eq!(totals.dropped, 1);
        assert_eq!(totals.encode_failures, 1);
    }
}
