use clap::Parser;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use fusevisor_readiness::FUSE_READY_LINE;

/// Stand-in for a FUSE filesystem daemon in fusevisor E2E tests.
///
/// stdout is the readiness protocol channel; logging only ever goes to
/// stderr and only with --verbose.
#[derive(Parser, Debug)]
#[command(name = "testexe")]
#[command(about = "Test daemon for fusevisor testing", long_about = None)]
struct Args {
    /// Line to print before the readiness line (repeatable)
    #[arg(long)]
    print: Vec<String>,

    /// Readiness announcement
    #[arg(long, default_value = FUSE_READY_LINE)]
    ready_line: String,

    /// Never announce readiness; exit right after the --print lines
    #[arg(long)]
    no_ready: bool,

    /// Line to print after the readiness line (repeatable)
    #[arg(long)]
    after_ready: Vec<String>,

    /// Line to print to stderr (repeatable)
    #[arg(long)]
    stderr: Vec<String>,

    /// Exit code to return on shutdown
    #[arg(long, default_value = "0")]
    exit_code: i32,

    /// Keep running after SIGTERM/SIGINT; only SIGKILL stops it
    #[arg(long)]
    ignore_term: bool,

    /// Duration in seconds to run before exiting (0 = until signalled)
    #[arg(long, default_value = "0")]
    run_duration: u64,

    /// Log to stderr
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .init();
    }
    debug!("Starting testexe with args: {:?}", args);

    // Handlers go in before readiness so an early SIGTERM is never fatal.
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    for line in &args.print {
        println!("{line}");
    }
    for line in &args.stderr {
        eprintln!("{line}");
    }

    if args.no_ready {
        info!("Exiting without readiness (code {})", args.exit_code);
        std::process::exit(args.exit_code);
    }

    println!("{}", args.ready_line);
    for line in &args.after_ready {
        println!("{line}");
    }
    info!("Testexe is ready");

    let deadline = async {
        if args.run_duration > 0 {
            sleep(Duration::from_secs(args.run_duration)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                if args.ignore_term {
                    warn!("Ignoring SIGTERM");
                    continue;
                }
                info!("Received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                if args.ignore_term {
                    warn!("Ignoring SIGINT");
                    continue;
                }
                info!("Received SIGINT, shutting down");
                break;
            }
            _ = &mut deadline => {
                info!("Run duration elapsed");
                break;
            }
        }
    }

    std::process::exit(args.exit_code);
}
