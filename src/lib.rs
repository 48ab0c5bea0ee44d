//! seed-sieve - Short BIP39 Mnemonic Finder
//!
//! Generates random 128-bit entropy on every core, encodes each block as a
//! 12-word BIP39 phrase and keeps the phrases whose letter count (spaces
//! excluded) falls under a threshold. Runs continuously while keeping CPU and
//! accelerator usage under a configurable budget.
//!
//! # Features
//!
//! - **Parallel Producers**: One OS thread per core pulls entropy, encodes
//!   and measures phrases.
//!
//! - **Backpressure**: A bounded queue sits between producers and the single
//!   collector. Producers never block on it; a full queue halves their batch
//!   size and backs them off.
//!
//! - **Resource Budget**: A monitor samples CPU (and, with the
//!   `gpu-monitoring` feature, GPU) utilization and publishes throttle
//!   factors the producers apply in real time.
//!
//! - **Tiered Selection**: Very short phrases are all kept; slightly longer
//!   ones are capped per length. Duplicates are never kept twice.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Entropy Source                            │
//! │                 (thread_rng or seeded ChaCha8)                   │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ 16-byte blocks
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Producer Threads                            │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐     │
//! │  │Worker 1 │  │Worker 2 │  │Worker 3 │  ...    │Worker N │     │
//! │  │ BIP39   │  │ BIP39   │  │ BIP39   │         │ BIP39   │     │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘     │
//! │       └────────────┼────────────┼────────────────────┘          │
//! │                    ▼            ▼            ▲                  │
//! │            ┌──────────────────────────┐     │ throttle          │
//! │            │    Candidate Queue       │   ┌─┴────────────────┐  │
//! │            │  (crossbeam bounded)     │   │ Resource Monitor │  │
//! │            │  - try_send, never block │   │ sysinfo / NVML   │  │
//! │            └────────────┬─────────────┘   └──────────────────┘  │
//! │                         ▼                                       │
//! │            ┌──────────────────────────┐                         │
//! │            │       Collector          │                         │
//! │            │  - tiered selection      │                         │
//! │            │  - dedup ledger          │                         │
//! │            └────────────┬─────────────┘                         │
//! └─────────────────────────┼───────────────────────────────────────┘
//!                           ▼
//!                ┌──────────────────────┐
//!                │  mnemonics_log.txt   │
//!                │  (append only)       │
//!                └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Defaults: < 46 letters, <= 42 unlimited, 5 per length above
//! seed-sieve
//!
//! # Stricter search, 10 minutes, seed list at the end
//! seed-sieve --threshold 44 --duration 600 -o seeds.txt
//! ```

pub mod config;
pub mod entropy;
pub mod error;
pub mod mnemonic;
pub mod pipeline;
pub mod progress;
pub mod sink;

pub use config::{CliArgs, HuntConfig};
pub use entropy::{EntropyBlock, EntropySource, OsEntropySource, SeededEntropySource, ENTROPY_BYTES};
pub use error::{Result, SieveError};
pub use mnemonic::{letter_count, Bip39Encoder, MnemonicEncoder};
pub use pipeline::{CancellationToken, HuntReport, StopReason, Supervisor};
pub use progress::ProgressReporter;
pub use sink::{AppendLog, MemorySink, ResultSink};
