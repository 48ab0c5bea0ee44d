//! Error types for seed-sieve
//!
//! This module defines the error hierarchy for the pipeline:
//! - Configuration and CLI errors
//! - Entropy source and encoder failures
//! - Resource sampling failures
//! - Log sink failures
//! - Worker thread errors
//!
//! Queue-full, queue-empty and selection rejections are not errors. They are
//! steady-state outcomes and are modelled as plain enums next to the code
//! that produces them (`EnqueueOutcome`, `DequeueOutcome`, `Verdict`).

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the seed-sieve application
#[derive(Error, Debug)]
pub enum SieveError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Entropy source errors
    #[error("Entropy error: {0}")]
    Entropy(#[from] EntropyError),

    /// Encoder errors
    #[error("Encoder error: {0}")]
    Encode(#[from] EncodeError),

    /// Resource monitor errors
    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),

    /// Log sink errors
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration and CLI errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Acceptance threshold out of range
    #[error("Invalid threshold {value}: must be between {min} and {max}")]
    InvalidThreshold { value: usize, min: usize, max: usize },

    /// Unlimited tier overlaps or exceeds the acceptance threshold
    #[error("Invalid unlimited threshold {value}: must be below the acceptance threshold {threshold}")]
    InvalidUnlimitedThreshold { value: usize, threshold: usize },

    /// Per-metric cap out of range
    #[error("Invalid count {value}: must be between {min} and {max}")]
    InvalidCount { value: usize, min: usize, max: usize },

    /// Batch size out of range
    #[error("Invalid batch size {size}: must be between {min} and {max}")]
    InvalidBatchSize { size: usize, min: usize, max: usize },

    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid queue size
    #[error("Invalid queue size {size}: must be at least {min}")]
    InvalidQueueSize { size: usize, min: usize },

    /// A fraction that must lie in (0, 1]
    #[error("Invalid {name} {value}: must be greater than 0 and at most 1")]
    InvalidFraction { name: &'static str, value: f64 },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },
}

/// Entropy source failures
#[derive(Error, Debug, Clone)]
pub enum EntropyError {
    /// Backend temporarily unable to produce blocks
    #[error("Entropy backend '{backend}' unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    /// Backend returned fewer blocks than requested
    #[error("Entropy backend '{backend}' returned {got} of {requested} blocks")]
    ShortBatch {
        backend: String,
        requested: usize,
        got: usize,
    },

    /// Backend failed in a way that retrying will not fix
    #[error("Entropy backend '{backend}' failed: {reason}")]
    Fatal { backend: String, reason: String },
}

impl EntropyError {
    /// Check if this error is expected to clear on retry
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EntropyError::Unavailable { .. } | EntropyError::ShortBatch { .. }
        )
    }
}

/// Mnemonic encoder failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Block length is not a valid entropy size
    #[error("Invalid entropy length {len} bytes")]
    InvalidLength { len: usize },

    /// Encoder rejected the block for another reason
    #[error("Encoding failed: {0}")]
    Rejected(String),
}

/// Resource sampling failures
#[derive(Error, Debug, Clone)]
pub enum MonitorError {
    /// Sampler produced an unusable reading
    #[error("Invalid {resource} reading: {value}")]
    InvalidReading { resource: &'static str, value: f64 },

    /// Probe for a resource failed
    #[error("Failed to sample {resource}: {reason}")]
    SampleFailed {
        resource: &'static str,
        reason: String,
    },

    /// Monitor thread could not be started
    #[error("Failed to start resource monitor: {0}")]
    SpawnFailed(String),
}

/// Log sink errors
#[derive(Error, Debug)]
pub enum SinkError {
    /// Failed to open the log file
    #[error("Failed to open log '{path}': {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to append a record
    #[error("Failed to write record to '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker initialization failed
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },

    /// No worker could be started
    #[error("No workers could be started")]
    NoWorkers,

    /// Background thread (monitor, listener) failed to join
    #[error("Thread '{name}' failed to join: {message}")]
    JoinFailed { name: String, message: String },
}

/// Result type alias for SieveError
pub type Result<T> = std::result::Result<T, SieveError>;

/// Result type alias for SinkError
pub type SinkResult<T> = std::result::Result<T, SinkError>;
