//! Shared throttle state
//!
//! One [`ThrottlePublisher`] (owned by the resource monitor) writes; any number
//! of [`ThrottleReader`]s (workers, collector) read. The four fields are kept
//! behind a sequence counter so a reader always gets a consistent snapshot
//! without ever waiting on the writer: if a write is in flight the reader
//! retries, and after a few failed attempts falls back to the last snapshot it
//! successfully read.

use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::Arc;

/// Retries before a reader settles for its previous snapshot
const READ_ATTEMPTS: usize = 64;

/// Smallest factor ever published; keeps the value inside (0, 1]
pub const MIN_FACTOR: f64 = 1e-3;

/// A point-in-time view of the throttle state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleSnapshot {
    /// CPU throttle factor in (0, 1], 1.0 = unthrottled
    pub cpu_throttle: f64,

    /// Accelerator throttle factor in (0, 1]
    pub gpu_throttle: f64,

    /// Last observed CPU utilization in [0, 1]
    pub cpu_usage: f64,

    /// Last observed accelerator utilization in [0, 1]
    pub gpu_usage: f64,
}

impl ThrottleSnapshot {
    /// Unthrottled state with unknown usage
    pub const fn unthrottled() -> Self {
        Self {
            cpu_throttle: 1.0,
            gpu_throttle: 1.0,
            cpu_usage: 0.0,
            gpu_usage: 0.0,
        }
    }

    /// The more restrictive of the two factors
    pub fn effective_factor(&self) -> f64 {
        self.cpu_throttle.min(self.gpu_throttle)
    }

    /// Whether either resource is currently throttled
    pub fn is_throttled(&self) -> bool {
        self.cpu_throttle < 1.0 || self.gpu_throttle < 1.0
    }

    /// Clamp every field into its documented range
    fn sanitized(self) -> Self {
        Self {
            cpu_throttle: clamp_factor(self.cpu_throttle),
            gpu_throttle: clamp_factor(self.gpu_throttle),
            cpu_usage: clamp_usage(self.cpu_usage),
            gpu_usage: clamp_usage(self.gpu_usage),
        }
    }
}

impl Default for ThrottleSnapshot {
    fn default() -> Self {
        Self::unthrottled()
    }
}

fn clamp_factor(value: f64) -> f64 {
    if value.is_nan() {
        1.0
    } else {
        value.clamp(MIN_FACTOR, 1.0)
    }
}

fn clamp_usage(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Sequence-locked storage for the four fields
#[derive(Debug)]
struct ThrottleCell {
    /// Odd while a write is in progress
    seq: AtomicU64,
    cpu_throttle: AtomicU64,
    gpu_throttle: AtomicU64,
    cpu_usage: AtomicU64,
    gpu_usage: AtomicU64,
}

impl ThrottleCell {
    fn new(initial: ThrottleSnapshot) -> Self {
        Self {
            seq: AtomicU64::new(0),
            cpu_throttle: AtomicU64::new(initial.cpu_throttle.to_bits()),
            gpu_throttle: AtomicU64::new(initial.gpu_throttle.to_bits()),
            cpu_usage: AtomicU64::new(initial.cpu_usage.to_bits()),
            gpu_usage: AtomicU64::new(initial.gpu_usage.to_bits()),
        }
    }

    fn try_read(&self) -> Option<ThrottleSnapshot> {
        let before = self.seq.load(Ordering::Acquire);
        if before & 1 == 1 {
            return None;
        }

        let snapshot = ThrottleSnapshot {
            cpu_throttle: f64::from_bits(self.cpu_throttle.load(Ordering::Relaxed)),
            gpu_throttle: f64::from_bits(self.gpu_throttle.load(Ordering::Relaxed)),
            cpu_usage: f64::from_bits(self.cpu_usage.load(Ordering::Relaxed)),
            gpu_usage: f64::from_bits(self.gpu_usage.load(Ordering::Relaxed)),
        };

        fence(Ordering::Acquire);
        let after = self.seq.load(Ordering::Relaxed);
        (before == after).then_some(snapshot)
    }

    /// Only called through the single `ThrottlePublisher`
    fn write(&self, snapshot: ThrottleSnapshot) {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        self.cpu_throttle
            .store(snapshot.cpu_throttle.to_bits(), Ordering::Relaxed);
        self.gpu_throttle
            .store(snapshot.gpu_throttle.to_bits(), Ordering::Relaxed);
        self.cpu_usage
            .store(snapshot.cpu_usage.to_bits(), Ordering::Relaxed);
        self.gpu_usage
            .store(snapshot.gpu_usage.to_bits(), Ordering::Relaxed);

        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }
}

/// Constructor for the reader/publisher pair
pub struct ThrottleState;

impl ThrottleState {
    /// Create shared state starting unthrottled
    pub fn pair() -> (ThrottleReader, ThrottlePublisher) {
        let cell = Arc::new(ThrottleCell::new(ThrottleSnapshot::unthrottled()));
        (
            ThrottleReader {
                cell: Arc::clone(&cell),
                last: ThrottleSnapshot::unthrottled(),
            },
            ThrottlePublisher { cell },
        )
    }
}

/// Read handle; clone one per worker
#[derive(Debug, Clone)]
pub struct ThrottleReader {
    cell: Arc<ThrottleCell>,
    last: ThrottleSnapshot,
}

impl ThrottleReader {
    /// Current snapshot. Never blocks; may be stale by one write.
    pub fn snapshot(&mut self) -> ThrottleSnapshot {
        for _ in 0..READ_ATTEMPTS {
            if let Some(snapshot) = self.cell.try_read() {
                self.last = snapshot;
                return snapshot;
            }
            std::hint::spin_loop();
        }
        self.last
    }

    /// Shorthand for `snapshot().effective_factor()`
    pub fn effective_factor(&mut self) -> f64 {
        self.snapshot().effective_factor()
    }
}

/// The write handle. There is exactly one, so it is not `Clone`.
#[derive(Debug)]
pub struct ThrottlePublisher {
    cell: Arc<ThrottleCell>,
}

impl ThrottlePublisher {
    /// Publish factors and usages as one update
    pub fn publish(&self, snapshot: ThrottleSnapshot) {
        self.cell.write(snapshot.sanitized());
    }

    /// Fail open: drop both factors back to 1.0, keep the last usages
    pub fn reset(&self) {
        let current = self.cell.try_read().unwrap_or_default();
        self.cell.write(ThrottleSnapshot {
            cpu_throttle: 1.0,
            gpu_throttle: 1.0,
            ..current
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_starts_unthrottled() {
        let (mut reader, _publisher) = ThrottleState::pair();
        let snapshot = reader.snapshot();
        assert_eq!(snapshot, ThrottleSnapshot::unthrottled());
        assert_eq!(snapshot.effective_factor(), 1.0);
        assert!(!snapshot.is_throttled());
    }

    #[test]
    fn test_publish_visible_to_readers() {
        let (mut reader, publisher) = ThrottleState::pair();
        let mut other = reader.clone();

        publisher.publish(ThrottleSnapshot {
            cpu_throttle: 0.5,
            gpu_throttle: 0.9,
            cpu_usage: 0.95,
            gpu_usage: 0.85,
        });

        assert_eq!(reader.effective_factor(), 0.5);
        assert!(other.snapshot().is_throttled());
        assert_eq!(other.snapshot().gpu_usage, 0.85);
    }

    #[test]
    fn test_publish_clamps_out_of_range() {
        let (mut reader, publisher) = ThrottleState::pair();
        publisher.publish(ThrottleSnapshot {
            cpu_throttle: 0.0,
            gpu_throttle: 7.0,
            cpu_usage: 1.5,
            gpu_usage: f64::NAN,
        });

        let snapshot = reader.snapshot();
        assert!(snapshot.cpu_throttle > 0.0 && snapshot.cpu_throttle <= 1.0);
        assert_eq!(snapshot.gpu_throttle, 1.0);
        assert_eq!(snapshot.cpu_usage, 1.0);
        assert_eq!(snapshot.gpu_usage, 0.0);
    }

    #[test]
    fn test_reset_keeps_usage() {
        let (mut reader, publisher) = ThrottleState::pair();
        publisher.publish(ThrottleSnapshot {
            cpu_throttle: 0.4,
            gpu_throttle: 0.6,
            cpu_usage: 0.97,
            gpu_usage: 0.9,
        });
        publisher.reset();

        let snapshot = reader.snapshot();
        assert_eq!(snapshot.cpu_throttle, 1.0);
        assert_eq!(snapshot.gpu_throttle, 1.0);
        assert_eq!(snapshot.cpu_usage, 0.97);
    }

    #[test]
    fn test_snapshots_are_internally_consistent() {
        // Every published snapshot has all four fields equal to the same
        // value; a torn read would mix two values.
        let (reader, publisher) = ThrottleState::pair();
        let done = Arc::new(AtomicBool::new(false));
        let ready = Arc::new(Barrier::new(5));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let mut reader = reader.clone();
                let done = Arc::clone(&done);
                let ready = Arc::clone(&ready);
                thread::spawn(move || {
                    assert_eq!(reader.snapshot(), ThrottleSnapshot::unthrottled());
                    let mut reads = 1u64;
                    ready.wait();
                    while !done.load(Ordering::Relaxed) {
                        let s = reader.snapshot();
                        if s != ThrottleSnapshot::unthrottled() {
                            assert_eq!(s.cpu_throttle, s.gpu_throttle);
                            assert_eq!(s.cpu_throttle, s.cpu_usage);
                            assert_eq!(s.cpu_usage, s.gpu_usage);
                        }
                        reads += 1;
                    }
                    reads
                })
            })
            .collect();

        // Every reader is running before the first write
        ready.wait();
        for i in 1..20_000u32 {
            let v = (i % 999 + 1) as f64 / 1000.0;
            publisher.publish(ThrottleSnapshot {
                cpu_throttle: v,
                gpu_throttle: v,
                cpu_usage: v,
                gpu_usage: v,
            });
        }
        done.store(true, Ordering::Relaxed);

        for handle in readers {
            assert!(handle.join().unwrap() > 0);
        }
    }
}
