//! Entropy sources
//!
//! An [`EntropySource`] hands out fixed-size random blocks in batches. Workers
//! call it concurrently, so implementations must be `Send + Sync` and must not
//! block for longer than it takes to fill the requested number of blocks.
//!
//! Two CPU backends are provided:
//! - [`OsEntropySource`] draws from the thread-local OS-seeded generator
//! - [`SeededEntropySource`] draws from one ChaCha8 stream for reproducible runs

use crate::error::EntropyError;
use parking_lot::Mutex;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Bytes per entropy block (128 bits -> 12-word phrase)
pub const ENTROPY_BYTES: usize = 16;

/// One fixed-size block of entropy
pub type EntropyBlock = [u8; ENTROPY_BYTES];

/// Produces batches of entropy blocks
pub trait EntropySource: Send + Sync {
    /// Generate `count` blocks
    fn generate(&self, count: usize) -> Result<Vec<EntropyBlock>, EntropyError>;

    /// Backend name for logs and the header
    fn name(&self) -> &str;
}

/// CPU backend using the thread-local generator
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropySource;

impl OsEntropySource {
    pub fn new() -> Self {
        Self
    }
}

impl EntropySource for OsEntropySource {
    fn generate(&self, count: usize) -> Result<Vec<EntropyBlock>, EntropyError> {
        let mut rng = rand::thread_rng();
        let mut blocks = vec![[0u8; ENTROPY_BYTES]; count];
        for block in blocks.iter_mut() {
            rng.try_fill_bytes(block)
                .map_err(|e| EntropyError::Fatal {
                    backend: self.name().to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(blocks)
    }

    fn name(&self) -> &str {
        "cpu"
    }
}

/// Deterministic ChaCha8 backend shared by all workers
///
/// The stream as a whole is reproducible for a given seed; how it is split
/// between workers depends on scheduling.
pub struct SeededEntropySource {
    rng: Mutex<ChaCha8Rng>,
}

impl SeededEntropySource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }
}

impl EntropySource for SeededEntropySource {
    fn generate(&self, count: usize) -> Result<Vec<EntropyBlock>, EntropyError> {
        let mut blocks = vec![[0u8; ENTROPY_BYTES]; count];
        let mut rng = self.rng.lock();
        for block in blocks.iter_mut() {
            rng.fill(block);
        }
        Ok(blocks)
    }

    fn name(&self) -> &str {
        "cpu-seeded"
    }
}
