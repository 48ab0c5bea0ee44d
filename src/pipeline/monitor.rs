//! Resource monitor
//!
//! Samples CPU and accelerator utilization on a fixed period, turns each
//! reading into a throttle factor against the configured budget and publishes
//! both as one update. Any sampling failure resets the factors to 1.0 so a
//! broken probe can only disable throttling, never stall generation.

use crate::error::{MonitorError, WorkerError};
use crate::pipeline::cancel::CancellationToken;
use crate::pipeline::throttle::{ThrottlePublisher, ThrottleSnapshot};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use sysinfo::System;
use tracing::{debug, info, warn};

/// Margin above the budget used in the throttle denominator
const BUDGET_EPSILON: f64 = 0.01;

/// Throttle factor for one resource
///
/// `budget / max(usage, budget + 0.01)` when `usage` is over budget, exactly
/// `1.0` otherwise. The result is always in (0, 1].
pub fn throttle_factor(usage: f64, budget: f64) -> f64 {
    if usage > budget {
        budget / usage.max(budget + BUDGET_EPSILON)
    } else {
        1.0
    }
}

/// One utilization reading, both values normalized to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UsageSample {
    pub cpu: f64,
    pub gpu: f64,
}

impl UsageSample {
    pub fn new(cpu: f64, gpu: f64) -> Self {
        Self { cpu, gpu }
    }

    /// Reject NaN, infinities and values outside [0, 1]
    pub fn validate(self) -> Result<Self, MonitorError> {
        check_reading("cpu", self.cpu)?;
        check_reading("gpu", self.gpu)?;
        Ok(self)
    }
}

fn check_reading(resource: &'static str, value: f64) -> Result<(), MonitorError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(MonitorError::InvalidReading { resource, value })
    }
}

/// Source of utilization readings
pub trait UsageSampler: Send {
    /// Take one reading
    fn sample(&mut self) -> Result<UsageSample, MonitorError>;

    /// Short description for the startup log
    fn describe(&self) -> String;
}

/// Host sampler: sysinfo for the CPU, NVML for the accelerator when built
/// with the `gpu-monitoring` feature
pub struct SystemSampler {
    system: System,

    #[cfg(feature = "gpu-monitoring")]
    nvml: Option<nvml_wrapper::Nvml>,
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        // First refresh only primes the counters; usage is measured between
        // two refreshes
        system.refresh_cpu_usage();

        Self {
            system,
            #[cfg(feature = "gpu-monitoring")]
            nvml: init_nvml(),
        }
    }

    fn cpu_usage(&mut self) -> Result<f64, MonitorError> {
        self.system.refresh_cpu_usage();
        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return Err(MonitorError::SampleFailed {
                resource: "cpu",
                reason: "no CPUs reported".into(),
            });
        }

        let total: f64 = cpus.iter().map(|c| f64::from(c.cpu_usage())).sum();
        // Per-core readings can overshoot 100% by rounding
        Ok((total / cpus.len() as f64 / 100.0).min(1.0))
    }

    #[cfg(feature = "gpu-monitoring")]
    fn gpu_usage(&mut self) -> Result<f64, MonitorError> {
        let Some(nvml) = self.nvml.as_ref() else {
            return Ok(0.0);
        };

        let device = nvml
            .device_by_index(0)
            .map_err(|e| MonitorError::SampleFailed {
                resource: "gpu",
                reason: e.to_string(),
            })?;
        let rates = device
            .utilization_rates()
            .map_err(|e| MonitorError::SampleFailed {
                resource: "gpu",
                reason: e.to_string(),
            })?;
        Ok((f64::from(rates.gpu) / 100.0).min(1.0))
    }

    #[cfg(not(feature = "gpu-monitoring"))]
    fn gpu_usage(&mut self) -> Result<f64, MonitorError> {
        Ok(0.0)
    }

    #[cfg(feature = "gpu-monitoring")]
    fn has_gpu(&self) -> bool {
        self.nvml.is_some()
    }

    #[cfg(not(feature = "gpu-monitoring"))]
    fn has_gpu(&self) -> bool {
        false
    }
}

#[cfg(feature = "gpu-monitoring")]
fn init_nvml() -> Option<nvml_wrapper::Nvml> {
    match nvml_wrapper::Nvml::init() {
        Ok(nvml) => Some(nvml),
        Err(e) => {
            warn!(error = %e, "NVML unavailable, GPU usage reported as 0");
            None
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageSampler for SystemSampler {
    fn sample(&mut self) -> Result<UsageSample, MonitorError> {
        let cpu = self.cpu_usage()?;
        let gpu = self.gpu_usage()?;
        Ok(UsageSample::new(cpu, gpu))
    }

    fn describe(&self) -> String {
        if self.has_gpu() {
            "sysinfo + nvml".into()
        } else {
            "sysinfo".into()
        }
    }
}

/// Counters kept by the monitor thread
#[derive(Debug, Default)]
pub struct MonitorStats {
    /// Successful samples published
    pub samples: AtomicU64,

    /// Failed samples (each one reset the throttle)
    pub failures: AtomicU64,
}

/// Spawns the monitor thread
pub struct ResourceMonitor;

impl ResourceMonitor {
    pub fn spawn(
        mut sampler: Box<dyn UsageSampler>,
        publisher: ThrottlePublisher,
        token: CancellationToken,
        interval: Duration,
        budget: f64,
    ) -> Result<MonitorHandle, MonitorError> {
        let stats = Arc::new(MonitorStats::default());
        let thread_stats = Arc::clone(&stats);

        info!(
            backend = %sampler.describe(),
            budget = budget,
            interval_ms = interval.as_millis() as u64,
            "Resource monitor starting"
        );

        let handle = thread::Builder::new()
            .name("resource-monitor".into())
            .spawn(move || {
                monitor_loop(
                    sampler.as_mut(),
                    &publisher,
                    &token,
                    interval,
                    budget,
                    &thread_stats,
                )
            })
            .map_err(|e| MonitorError::SpawnFailed(e.to_string()))?;

        Ok(MonitorHandle { handle, stats })
    }
}

fn monitor_loop(
    sampler: &mut dyn UsageSampler,
    publisher: &ThrottlePublisher,
    token: &CancellationToken,
    interval: Duration,
    budget: f64,
    stats: &MonitorStats,
) {
    let mut failing = false;

    while !token.is_cancelled() {
        match sampler.sample().and_then(UsageSample::validate) {
            Ok(usage) => {
                let snapshot = ThrottleSnapshot {
                    cpu_throttle: throttle_factor(usage.cpu, budget),
                    gpu_throttle: throttle_factor(usage.gpu, budget),
                    cpu_usage: usage.cpu,
                    gpu_usage: usage.gpu,
                };
                publisher.publish(snapshot);
                stats.samples.fetch_add(1, Ordering::Relaxed);

                if failing {
                    info!("Resource sampling recovered");
                    failing = false;
                }
                if snapshot.is_throttled() {
                    debug!(
                        cpu = usage.cpu,
                        gpu = usage.gpu,
                        cpu_throttle = snapshot.cpu_throttle,
                        gpu_throttle = snapshot.gpu_throttle,
                        "Over budget"
                    );
                }
            }
            Err(e) => {
                publisher.reset();
                stats.failures.fetch_add(1, Ordering::Relaxed);

                // Warn once per failure streak
                if !failing {
                    warn!(error = %e, "Resource sampling failed, throttling disabled");
                    failing = true;
                } else {
                    debug!(error = %e, "Resource sampling still failing");
                }
            }
        }

        if !token.sleep(interval) {
            break;
        }
    }

    debug!("Resource monitor stopped");
}

/// Handle to the running monitor thread
pub struct MonitorHandle {
    handle: JoinHandle<()>,
    stats: Arc<MonitorStats>,
}

impl MonitorHandle {
    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the monitor to exit. Cancel the token first.
    pub fn join(self) -> Result<(), WorkerError> {
        self.handle.join().map_err(|_| WorkerError::JoinFailed {
            name: "resource-monitor".into(),
            message: "Monitor thread panicked".into(),
        })
    }
}
