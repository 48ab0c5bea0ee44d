//! seed-sieve - Short BIP39 Mnemonic Finder
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use seed_sieve::config::{CliArgs, HuntConfig};
use seed_sieve::entropy::{EntropySource, OsEntropySource, SeededEntropySource};
use seed_sieve::mnemonic::Bip39Encoder;
use seed_sieve::pipeline::{StopReason, Supervisor, SystemSampler};
use seed_sieve::progress::{print_header, print_summary, ProgressReporter};
use seed_sieve::sink::{write_seed_list, AppendLog};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = HuntConfig::from_args(args).context("Invalid configuration")?;

    let source: Arc<dyn EntropySource> = match config.seed {
        Some(seed) => {
            info!(seed = seed, "Using seeded entropy stream");
            Arc::new(SeededEntropySource::new(seed))
        }
        None => Arc::new(OsEntropySource::new()),
    };

    let log = AppendLog::open(&config.log_path).context("Failed to open result log")?;

    // Print header
    if config.show_progress {
        print_header(&config, source.name());
    }

    let output_path = config.output_path.clone();
    let show_progress = config.show_progress;

    let supervisor = Supervisor::new(
        config,
        source,
        Arc::new(Bip39Encoder::english()),
        Box::new(log),
        Box::new(SystemSampler::new()),
    );

    // Setup signal handler for graceful shutdown
    let token = supervisor.cancellation_token();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        token.cancel();
    })
    .context("Failed to set signal handler")?;

    let progress = if show_progress {
        ProgressReporter::new()
    } else {
        ProgressReporter::quiet()
    };

    // Run the hunt
    let report = supervisor.run(progress.clone()).context("Hunt failed")?;
    progress.finish_and_clear();

    if let Some(ref path) = output_path {
        match write_seed_list(path, &report.ledger) {
            Ok(count) => info!(count = count, "Seed list written"),
            Err(e) => {
                warn!(error = %e, "Failed to write seed list");
                eprintln!("Warning: {}", e);
            }
        }
    }

    // Print summary
    if show_progress {
        print_summary(&report);
    }

    if report.cancelled_by == StopReason::ProducersGone {
        warn!("All workers exited before a stop was requested");
    }
    if report.sink_errors > 0 {
        warn!(errors = report.sink_errors, "Some results were not written to the log");
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("seed_sieve=debug,warn")
    } else {
        EnvFilter::new("seed_sieve=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
