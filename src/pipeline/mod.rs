//! The concurrent production and filtering pipeline
//!
//! ```text
//!  ResourceMonitor ──publish──▶ ThrottleState ──read──┐
//!                                                     ▼
//!  EntropySource ──▶ Worker × N ──try_enqueue──▶ CandidateQueue ──dequeue──▶ Collector ──▶ ResultSink
//!                                                                             │
//!                                                                   ResultLedger (owned)
//!
//!  Supervisor: owns the CancellationToken; starts monitor + listener,
//!  then workers, then runs the collector; cancels and joins everything
//! ```

pub mod cancel;
pub mod collector;
pub mod monitor;
pub mod queue;
pub mod supervisor;
pub mod throttle;
pub mod worker;

pub use cancel::{CancellationToken, QuitListener};
pub use collector::{
    AcceptedRecord, Collector, CollectorReport, CollectorTimings, ResultLedger, SelectionPolicy,
    StopReason, Verdict,
};
pub use monitor::{throttle_factor, ResourceMonitor, SystemSampler, UsageSample, UsageSampler};
pub use queue::{Candidate, CandidateQueue, DequeueOutcome, EnqueueOutcome};
pub use supervisor::{HuntReport, Supervisor};
pub use throttle::{ThrottleReader, ThrottleSnapshot, ThrottleState};
pub use worker::{aggregate_stats, BatchController, Worker, WorkerContext, WorkerStats};
