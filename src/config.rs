//! Configuration types for seed-sieve
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Pipeline tuning constants

use crate::error::ConfigError;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Minimum queue size
const MIN_QUEUE_SIZE: usize = 1;

/// Acceptance threshold limits
const MIN_THRESHOLD: usize = 1;
const MAX_THRESHOLD: usize = 200;

/// Per-metric cap limits
const MIN_COUNT: usize = 1;
const MAX_COUNT: usize = 1000;

/// Batch size limits
const MIN_BATCH_SIZE: usize = 1;
const MAX_BATCH_SIZE: usize = 1_000_000;

/// Default tuning values
pub const DEFAULT_THRESHOLD: usize = 46;
pub const DEFAULT_UNLIMITED_THRESHOLD: usize = 42;
pub const DEFAULT_COUNT: usize = 5;
pub const DEFAULT_BATCH_SIZE: usize = 2048;
pub const DEFAULT_MIN_BATCH_SIZE: usize = 512;
pub const DEFAULT_QUEUE_SIZE: usize = 50_000;
pub const DEFAULT_BUDGET: f64 = 0.80;
pub const DEFAULT_HIGH_WATER: f64 = 0.9;

/// Search a random entropy stream for short BIP39 recovery phrases
#[derive(Parser, Debug, Clone)]
#[command(
    name = "seed-sieve",
    version,
    about = "Search random entropy for short BIP39 recovery phrases",
    long_about = "Generates random 128-bit entropy on all cores, encodes it as 12-word BIP39\n\
                  phrases and keeps the ones whose total letter count is below a threshold.\n\n\
                  Producers are throttled so CPU and accelerator usage stay within a budget.",
    after_help = "EXAMPLES:\n    \
        seed-sieve\n    \
        seed-sieve --threshold 44 --count 10 --logfile short.txt\n    \
        seed-sieve --workers 4 --budget 0.6 --duration 600 --output seeds.txt\n    \
        seed-sieve --seed 42 --no-keyboard -q  # reproducible, non-interactive"
)]
pub struct CliArgs {
    /// Accept phrases with strictly fewer letters than this
    #[arg(long, default_value_t = DEFAULT_THRESHOLD, value_name = "CHARS")]
    pub threshold: usize,

    /// Phrases at or below this letter count are collected without a cap
    #[arg(long, default_value_t = DEFAULT_UNLIMITED_THRESHOLD, value_name = "CHARS")]
    pub unlimited_threshold: usize,

    /// Maximum phrases kept per letter count above the unlimited tier
    #[arg(long, default_value_t = DEFAULT_COUNT, value_name = "NUM")]
    pub count: usize,

    /// Append-only log of accepted phrases
    #[arg(long, default_value = "mnemonics_log.txt", value_name = "FILE")]
    pub logfile: PathBuf,

    /// Write the accepted phrases to this file when the run ends
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Maximum entropy blocks requested per worker iteration
    #[arg(short = 'b', long, default_value_t = DEFAULT_BATCH_SIZE, value_name = "NUM")]
    pub batch_size: usize,

    /// Smallest batch a worker shrinks to under backpressure
    #[arg(long, default_value_t = DEFAULT_MIN_BATCH_SIZE, value_name = "NUM")]
    pub min_batch_size: usize,

    /// Candidate queue capacity
    #[arg(long, default_value_t = DEFAULT_QUEUE_SIZE, value_name = "NUM")]
    pub queue_size: usize,

    /// Number of producer threads
    #[arg(short = 'w', long, default_value_t = default_workers(), value_name = "NUM")]
    pub workers: usize,

    /// Resource budget as a fraction of full CPU/accelerator usage
    #[arg(long, default_value_t = DEFAULT_BUDGET, value_name = "FRACTION")]
    pub budget: f64,

    /// Seed a deterministic ChaCha entropy stream (reproducible runs)
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Stop automatically after this many seconds
    #[arg(long, value_name = "SECS")]
    pub duration: Option<u64>,

    /// Do not listen for 'q' on stdin
    #[arg(long)]
    pub no_keyboard: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn default_workers() -> usize {
    num_cpus::get().max(1)
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct HuntConfig {
    /// Accept iff metric < acceptance_threshold
    pub acceptance_threshold: usize,

    /// Metric <= this is accepted without a cap
    pub unlimited_threshold: usize,

    /// Cap per metric value for the capped tier
    pub cap_per_metric: usize,

    /// Append log path
    pub log_path: PathBuf,

    /// End-of-run seed list
    pub output_path: Option<PathBuf>,

    /// Upper bound for a worker's batch size
    pub batch_size: usize,

    /// Lower bound for a worker's batch size
    pub min_batch_size: usize,

    /// Candidate queue capacity
    pub queue_capacity: usize,

    /// Number of worker threads
    pub worker_count: usize,

    /// Resource budget in (0, 1]
    pub resource_budget: f64,

    /// Queue fill ratio at which workers back off
    pub high_water: f64,

    /// ChaCha seed for reproducible entropy
    pub seed: Option<u64>,

    /// Automatic stop after this long
    pub max_runtime: Option<Duration>,

    /// Start the stdin quit listener
    pub listen_for_quit: bool,

    /// Show progress indicator
    pub show_progress: bool,

    /// Resource monitor sampling period
    pub monitor_interval: Duration,

    /// How often a worker re-reads the throttle factor
    pub throttle_check_interval: Duration,

    /// Sleep per unit of throttle (sleep = base * (1 - factor))
    pub throttle_delay_base: Duration,

    /// Base delay for backoff and retries
    pub worker_delay: Duration,

    /// Status line period
    pub status_interval: Duration,

    /// Collector dequeue timeout
    pub dequeue_timeout: Duration,

    /// Consecutive empty dequeues before a "waiting" notice
    pub idle_notice_after: u64,

    /// Quit listener poll period
    pub listener_poll: Duration,
}

impl Default for HuntConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: DEFAULT_THRESHOLD,
            unlimited_threshold: DEFAULT_UNLIMITED_THRESHOLD,
            cap_per_metric: DEFAULT_COUNT,
            log_path: PathBuf::from("mnemonics_log.txt"),
            output_path: None,
            batch_size: DEFAULT_BATCH_SIZE,
            min_batch_size: DEFAULT_MIN_BATCH_SIZE,
            queue_capacity: DEFAULT_QUEUE_SIZE,
            worker_count: default_workers(),
            resource_budget: DEFAULT_BUDGET,
            high_water: DEFAULT_HIGH_WATER,
            seed: None,
            max_runtime: None,
            listen_for_quit: true,
            show_progress: true,
            monitor_interval: Duration::from_millis(500),
            throttle_check_interval: Duration::from_millis(500),
            throttle_delay_base: Duration::from_millis(50),
            worker_delay: Duration::from_millis(10),
            status_interval: Duration::from_secs(5),
            dequeue_timeout: Duration::from_millis(100),
            idle_notice_after: 50,
            listener_poll: Duration::from_secs(1),
        }
    }
}

impl HuntConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        // Validate output paths
        check_parent_exists(&args.logfile)?;
        if let Some(ref output) = args.output {
            check_parent_exists(output)?;
        }

        let config = Self {
            acceptance_threshold: args.threshold,
            unlimited_threshold: args.unlimited_threshold,
            cap_per_metric: args.count,
            log_path: args.logfile,
            output_path: args.output,
            batch_size: args.batch_size,
            min_batch_size: args.min_batch_size,
            queue_capacity: args.queue_size,
            worker_count: args.workers,
            resource_budget: args.budget,
            seed: args.seed,
            max_runtime: args.duration.map(Duration::from_secs),
            listen_for_quit: !args.no_keyboard,
            show_progress: !args.quiet,
            ..Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_THRESHOLD..=MAX_THRESHOLD).contains(&self.acceptance_threshold) {
            return Err(ConfigError::InvalidThreshold {
                value: self.acceptance_threshold,
                min: MIN_THRESHOLD,
                max: MAX_THRESHOLD,
            });
        }

        if self.unlimited_threshold >= self.acceptance_threshold {
            return Err(ConfigError::InvalidUnlimitedThreshold {
                value: self.unlimited_threshold,
                threshold: self.acceptance_threshold,
            });
        }

        if !(MIN_COUNT..=MAX_COUNT).contains(&self.cap_per_metric) {
            return Err(ConfigError::InvalidCount {
                value: self.cap_per_metric,
                min: MIN_COUNT,
                max: MAX_COUNT,
            });
        }

        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(ConfigError::InvalidBatchSize {
                size: self.batch_size,
                min: MIN_BATCH_SIZE,
                max: MAX_BATCH_SIZE,
            });
        }

        // The floor must fit under the ceiling
        if self.min_batch_size < MIN_BATCH_SIZE || self.min_batch_size > self.batch_size {
            return Err(ConfigError::InvalidBatchSize {
                size: self.min_batch_size,
                min: MIN_BATCH_SIZE,
                max: self.batch_size,
            });
        }

        if self.worker_count == 0 || self.worker_count > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: self.worker_count,
                max: MAX_WORKERS,
            });
        }

        if self.queue_capacity < MIN_QUEUE_SIZE {
            return Err(ConfigError::InvalidQueueSize {
                size: self.queue_capacity,
                min: MIN_QUEUE_SIZE,
            });
        }

        check_fraction("budget", self.resource_budget)?;
        check_fraction("high-water mark", self.high_water)?;

        Ok(())
    }
}

fn check_fraction(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidFraction { name, value })
    }
}

fn check_parent_exists(path: &std::path::Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(ConfigError::InvalidOutputPath {
                path: path.to_path_buf(),
                reason: format!("Parent directory '{}' does not exist", parent.display()),
            });
        }
    }
    Ok(())
}
