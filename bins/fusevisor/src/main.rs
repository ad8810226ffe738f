use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::time::Duration;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{error, info, warn};

use fusevisor_common::SupervisorError;
use fusevisor_supervisor::{FusevisorConfig, ProcessSupervisor, UnmountReport};

/// Mount a filesystem daemon under supervision, then unmount and verify it
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Hold the mount for this many seconds (overrides config)
    #[arg(long)]
    run_duration: Option<u64>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct Summary {
    id: String,
    state: String,
    pid: Option<u32>,
    exit_code: Option<i32>,
    signal: Option<i32>,
    forced: bool,
    elapsed_ms: u64,
    diagnostic_errors: Option<u64>,
    verified: bool,
    verify_error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.debug)?;

    info!("Config file: {}", args.config);
    let config = FusevisorConfig::load_from_file(&args.config)?;
    let run_duration = args
        .run_duration
        .map(Duration::from_secs)
        .or(config.run.duration);
    let shutdown_timeout = config.supervisor.shutdown_timeout;

    let mut supervisor = ProcessSupervisor::new(config.supervisor)
        .context("Failed to create supervisor")?;
    info!(
        id = %supervisor.id(),
        target = %supervisor.config().target,
        "Mounting"
    );

    // Installed before mount so an interrupt never skips the unmount.
    let mut signals = ShutdownSignals::install().context("Failed to install signal handlers")?;

    let mounted = tokio::select! {
        mounted = supervisor.mount() => mounted,
        _ = signals.recv() => {
            // Returning drops the supervisor, which kills the daemon's process group.
            warn!("Interrupted before the mount was ready");
            anyhow::bail!("Interrupted during mount");
        }
    };
    if let Err(e) = mounted {
        error!("Mount failed: {}", e);
        if let Some(captured) = e.captured_output() {
            eprintln!("--- captured output ---\n{captured}");
        }
        return Err(anyhow::anyhow!("Mount failed: {}", e));
    }

    match run_duration {
        Some(duration) => info!("Holding mount for {:?}", duration),
        None => info!("Mounted; waiting for SIGINT or SIGTERM"),
    }
    hold(&mut signals, run_duration).await;

    let report = match supervisor.unmount(shutdown_timeout).await {
        Ok(report) => report,
        Err(e) => {
            error!("Unmount failed: {}", e);
            if let SupervisorError::DiagnosticFailure { ref log, .. } = e {
                eprintln!("--- diagnostic log ---\n{log}");
            }
            return Err(anyhow::anyhow!("Unmount failed: {}", e));
        }
    };
    if report.forced {
        warn!("Process had to be killed after {:?}", shutdown_timeout);
    }

    let verified = supervisor.verify();
    let summary = summarize(&supervisor, &report, verified.as_ref().err().map(ToString::to_string));
    print_summary(&summary, args.json)?;

    verified.map_err(|e| anyhow::anyhow!("Verification failed: {}", e))?;
    Ok(())
}

fn summarize(supervisor: &ProcessSupervisor, report: &UnmountReport, verify_error: Option<String>) -> Summary {
    Summary {
        id: supervisor.id().to_string(),
        state: supervisor.state().to_string(),
        pid: supervisor.pid(),
        exit_code: supervisor.exit_code(),
        signal: supervisor.outcome().and_then(|o| o.signal),
        forced: report.forced,
        elapsed_ms: report.elapsed.as_millis() as u64,
        diagnostic_errors: report.diagnostics.as_ref().map(|d| d.error_count),
        verified: verify_error.is_none(),
        verify_error,
    }
}

fn print_summary(summary: &Summary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("id:        {}", summary.id);
    println!("state:     {}", summary.state);
    println!("exit code: {:?}", summary.exit_code);
    println!("forced:    {}", summary.forced);
    println!("elapsed:   {} ms", summary.elapsed_ms);
    if let Some(errors) = summary.diagnostic_errors {
        println!("leak-check errors: {}", errors);
    }
    match summary.verify_error {
        Some(ref e) => println!("verify:    FAILED ({})", e),
        None => println!("verify:    ok"),
    }
    Ok(())
}

fn initialize_logging(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };

    // stdout carries the summary
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    Ok(())
}

/// Why the hold ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HoldEnd {
    Elapsed,
    Signal,
}

/// SIGTERM and SIGINT streams, registered up front.
struct ShutdownSignals {
    sigterm: Signal,
    sigint: Signal,
}

impl ShutdownSignals {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    async fn recv(&mut self) {
        tokio::select! {
            _ = self.sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = self.sigint.recv() => {
                info!("Received SIGINT signal");
            }
        }
    }
}

/// Wait for `duration` (forever when `None`) or a shutdown signal.
async fn hold(signals: &mut ShutdownSignals, duration: Option<Duration>) -> HoldEnd {
    let elapsed = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = elapsed => HoldEnd::Elapsed,
        _ = signals.recv() => HoldEnd::Signal,
    }
}
