//! Candidate queue with backpressure support
//!
//! A bounded FIFO between the workers and the collector. Producers never
//! block: when the queue is full the item is dropped and the caller backs off.
//! The single consumer waits with a timeout so it can keep polling for
//! cancellation.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A phrase and its selection metric
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    /// The encoded phrase
    pub phrase: String,

    /// Letter count of the phrase, spaces excluded
    pub metric: usize,
}

impl Candidate {
    pub fn new(phrase: String, metric: usize) -> Self {
        Self { phrase, metric }
    }
}

/// Result of a non-blocking enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Item accepted
    Enqueued,
    /// Queue at capacity, item dropped
    Full,
    /// Consumer gone
    Closed,
}

/// Result of a timed dequeue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DequeueOutcome {
    /// An item was available
    Item(Candidate),
    /// Nothing arrived before the timeout
    Empty,
    /// All producers gone and queue drained
    Closed,
}

/// Statistics for the candidate queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total candidates enqueued
    pub enqueued: AtomicU64,

    /// Total candidates dequeued
    pub dequeued: AtomicU64,

    /// Candidates dropped because the queue was full
    pub dropped: AtomicU64,
}

impl QueueStats {
    /// Get number of dropped candidates
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Bounded candidate queue
pub struct CandidateQueue {
    /// Sender for adding candidates
    sender: Sender<Candidate>,

    /// Receiver for getting candidates
    receiver: Receiver<Candidate>,

    /// Queue capacity
    capacity: usize,

    /// Queue statistics
    stats: Arc<QueueStats>,
}

impl CandidateQueue {
    /// Create a new queue with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);

        Self {
            sender,
            receiver,
            capacity,
            stats: Arc::new(QueueStats::default()),
        }
    }

    /// Get a producer handle (clone for each worker)
    pub fn producer(&self) -> QueueProducer {
        QueueProducer {
            sender: self.sender.clone(),
            capacity: self.capacity,
            stats: Arc::clone(&self.stats),
        }
    }

    /// Get the consumer handle
    pub fn consumer(&self) -> QueueConsumer {
        QueueConsumer {
            receiver: self.receiver.clone(),
            capacity: self.capacity,
            stats: Arc::clone(&self.stats),
        }
    }

    /// Split into the consumer, dropping the queue's own sender so the
    /// consumer observes `Closed` once every producer is gone
    pub fn into_consumer(self) -> QueueConsumer {
        QueueConsumer {
            receiver: self.receiver,
            capacity: self.capacity,
            stats: self.stats,
        }
    }

    /// Get queue statistics
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }

    /// Get current queue length
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Get queue capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Handle for adding candidates to the queue
#[derive(Clone)]
pub struct QueueProducer {
    sender: Sender<Candidate>,
    capacity: usize,
    stats: Arc<QueueStats>,
}

impl QueueProducer {
    /// Try to enqueue without blocking
    pub fn try_enqueue(&self, candidate: Candidate) -> EnqueueOutcome {
        match self.sender.try_send(candidate) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                EnqueueOutcome::Enqueued
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                EnqueueOutcome::Full
            }
            Err(TrySendError::Disconnected(_)) => EnqueueOutcome::Closed,
        }
    }

    /// Fraction of capacity in use, in [0, 1]
    pub fn occupancy(&self) -> f64 {
        self.sender.len() as f64 / self.capacity as f64
    }

    /// Get current queue length
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }

    /// Get queue capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Handle for taking candidates from the queue
pub struct QueueConsumer {
    receiver: Receiver<Candidate>,
    capacity: usize,
    stats: Arc<QueueStats>,
}

impl QueueConsumer {
    /// Wait up to `timeout` for the next candidate
    pub fn dequeue(&self, timeout: Duration) -> DequeueOutcome {
        match self.receiver.recv_timeout(timeout) {
            Ok(candidate) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                DequeueOutcome::Item(candidate)
            }
            Err(RecvTimeoutError::Timeout) => DequeueOutcome::Empty,
            Err(RecvTimeoutError::Disconnected) => DequeueOutcome::Closed,
        }
    }

    /// Get current queue length
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Get queue capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get queue statistics
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }
}
