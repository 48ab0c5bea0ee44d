//! Progress reporting for the hunt
//!
//! A spinner carries the periodically overwritten status line; acceptance
//! announcements and notices are printed above it so they stay in the
//! scrollback.

use crate::config::HuntConfig;
use crate::pipeline::collector::AcceptedRecord;
use crate::pipeline::throttle::ThrottleSnapshot;
use crate::pipeline::HuntReport;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::time::Duration;

/// One status update
#[derive(Debug, Clone, Copy)]
pub struct StatusLine {
    pub processed: u64,
    pub elapsed: Duration,
    pub throttle: ThrottleSnapshot,
}

impl StatusLine {
    /// Candidates per second since start
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed: {} ({}/s) | CPU: {:.1}% | GPU: {:.1}%",
            format_number(self.processed),
            format_number(self.rate().round() as u64),
            self.throttle.cpu_usage * 100.0,
            self.throttle.gpu_usage * 100.0,
        )?;
        if self.throttle.is_throttled() {
            write!(
                f,
                " [THROTTLE: CPU={:.2}, GPU={:.2}]",
                self.throttle.cpu_throttle, self.throttle.gpu_throttle
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Spinner plus announcements
    Interactive,
    /// No spinner, announcements on stdout
    Quiet,
    /// Nothing at all
    Silent,
}

/// Progress reporter that displays hunt status
///
/// Cheap to clone; clones drive the same spinner.
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
    mode: Mode,
}

impl ProgressReporter {
    /// Create a new progress reporter with a spinner
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_message("Starting workers...");

        Self {
            bar,
            mode: Mode::Interactive,
        }
    }

    /// No status line; accepted phrases and notices still printed
    pub fn quiet() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            mode: Mode::Quiet,
        }
    }

    /// Prints nothing
    pub fn silent() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            mode: Mode::Silent,
        }
    }

    /// Replace the status line
    pub fn update(&self, status: &StatusLine) {
        if self.mode == Mode::Interactive {
            self.bar.set_message(status.to_string());
        }
    }

    /// Print an accepted phrase above the status line
    pub fn announce(&self, record: &AcceptedRecord) {
        let text = format!(
            "{}\n  {} {}\n  {} {}\n  {} {}\n  {} {}",
            style("Found short mnemonic!").green().bold(),
            style("Mnemonic:").bold(),
            style(&record.phrase).cyan(),
            style("Total characters:").bold(),
            style(record.metric).yellow(),
            style("Total iterations:").bold(),
            format_number(record.iteration),
            style("Time elapsed:").bold(),
            format_elapsed(record.elapsed),
        );
        self.print(&text);
    }

    /// Print a diagnostic notice above the status line
    pub fn notice(&self, message: &str) {
        self.print(&style(message).yellow().to_string());
    }

    fn print(&self, text: &str) {
        match self.mode {
            Mode::Interactive => self.bar.println(text),
            Mode::Quiet => println!("{}", text),
            Mode::Silent => {}
        }
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// `H:MM:SS`, hours unpadded and unbounded
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Print a header at the start of the hunt
pub fn print_header(config: &HuntConfig, source: &str) {
    println!();
    println!(
        "{} {}",
        style("seed-sieve").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} < {} letters",
        style("Accepting:").bold(),
        config.acceptance_threshold
    );
    println!(
        "  {} <= {} letters unlimited, up to {} per length above",
        style("Tiers:").bold(),
        config.unlimited_threshold,
        config.cap_per_metric
    );
    println!(
        "  {} {} ({})",
        style("Workers:").bold(),
        config.worker_count,
        source
    );
    if let Some(seed) = config.seed {
        println!("  {} {}", style("Seed:").bold(), seed);
    }
    println!(
        "  {} {} (min {})",
        style("Batch size:").bold(),
        format_number(config.batch_size as u64),
        format_number(config.min_batch_size as u64)
    );
    println!(
        "  {} {:.0}%",
        style("Budget:").bold(),
        config.resource_budget * 100.0
    );
    println!("  {} {}", style("Log file:").bold(), config.log_path.display());
    if let Some(ref output) = config.output_path {
        println!("  {} {}", style("Seed list:").bold(), output.display());
    }
    if config.listen_for_quit {
        println!("  {}", style("Type 'q' and Enter to stop").dim());
    }
    println!();
}

/// Print a summary of the hunt results
pub fn print_summary(report: &HuntReport) {
    let secs = report.duration.as_secs_f64();
    let rate = if secs > 0.0 {
        report.processed as f64 / secs
    } else {
        0.0
    };

    println!();
    println!("{}", style("Hunt Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Processed:").bold(),
        format_number(report.processed)
    );
    println!(
        "  {} {} ({:.0}/s)",
        style("Duration:").bold(),
        format_elapsed(report.duration),
        rate
    );
    println!("  {} {}", style("Stopped:").bold(), report.cancelled_by);
    println!(
        "  {} {}",
        style("Accepted:").bold(),
        format_number(report.accepted as u64)
    );
    for (metric, count) in report.ledger.counts() {
        println!("    {:>3} letters: {}", metric, count);
    }
    if report.dropped > 0 {
        println!(
            "  {} {}",
            style("Dropped (queue full):").bold(),
            format_number(report.dropped)
        );
    }
    if report.encode_failures + report.entropy_failures > 0 {
        println!(
            "  {} {} encode, {} entropy",
            style("Failures:").yellow().bold(),
            format_number(report.encode_failures),
            format_number(report.entropy_failures)
        );
    }
    if report.sink_errors > 0 {
        println!(
            "  {} {}",
            style("Log write errors:").red().bold(),
            format_number(report.sink_errors)
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(processed: u64, secs: u64, throttle: ThrottleSnapshot) -> StatusLine {
        StatusLine {
            processed,
            elapsed: Duration::from_secs(secs),
            throttle,
        }
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0:00:00");
        assert_eq!(format_elapsed(Duration::from_millis(5_900)), "0:00:05");
        assert_eq!(format_elapsed(Duration::from_secs(3725)), "1:02:05");
        assert_eq!(format_elapsed(Duration::from_secs(100 * 3600)), "100:00:00");
    }

    #[test]
    fn test_status_line_unthrottled() {
        let mut throttle = ThrottleSnapshot::unthrottled();
        throttle.cpu_usage = 0.63;
        let line = status(100_000, 4, throttle);
        assert_eq!(line.rate(), 25_000.0);
        assert_eq!(
            line.to_string(),
            "Processed: 100,000 (25,000/s) | CPU: 63.0% | GPU: 0.0%"
        );
    }

    #[test]
    fn test_status_line_throttled_suffix() {
        let throttle = ThrottleSnapshot {
            cpu_throttle: 0.8 / 0.95,
            gpu_throttle: 1.0,
            cpu_usage: 0.95,
            gpu_usage: 0.0,
        };
        let line = status(10, 0, throttle);
        assert_eq!(line.rate(), 0.0);
        assert!(line
            .to_string()
            .ends_with("[THROTTLE: CPU=0.84, GPU=1.00]"));
    }

    #[test]
    fn test_silent_reporter_accepts_calls() {
        let reporter = ProgressReporter::silent();
        reporter.update(&status(1, 1, ThrottleSnapshot::unthrottled()));
        reporter.notice("nothing to see");
        reporter.finish_and_clear();
    }
}
