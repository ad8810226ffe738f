//! Stand-in for `valgrind --leak-check=full` in fusevisor E2E tests.
//!
//! ```text
//! fakegrind [--opt[=value]...] PROGRAM [ARGS...]
//! ```
//!
//! Understood options: `--log-file=PATH`, `--fake-errors=N`,
//! `--fake-contexts=N`, `--fake-no-summary`. Other options are accepted
//! and ignored. SIGTERM and SIGINT are forwarded to the program. The log
//! is written once the program exits; a killed fakegrind writes nothing.

use anyhow::{bail, Context, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::ffi::OsString;
use std::fmt::Write as _;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use tokio::process::Command;
use tokio::signal::unix::{signal, SignalKind};

#[derive(Debug, Default)]
struct Options {
    log_file: Option<PathBuf>,
    errors: u64,
    contexts: u64,
    no_summary: bool,
    program: OsString,
    args: Vec<OsString>,
}

fn parse_args(mut argv: impl Iterator<Item = OsString>) -> Result<Options> {
    let mut opts = Options::default();

    for arg in argv.by_ref() {
        let text = arg.to_string_lossy();
        if !text.starts_with("--") {
            opts.program = arg;
            break;
        }

        if let Some(path) = text.strip_prefix("--log-file=") {
            opts.log_file = Some(PathBuf::from(path));
        } else if let Some(n) = text.strip_prefix("--fake-errors=") {
            opts.errors = n.parse().context("--fake-errors")?;
        } else if let Some(n) = text.strip_prefix("--fake-contexts=") {
            opts.contexts = n.parse().context("--fake-contexts")?;
        } else if text == "--fake-no-summary" {
            opts.no_summary = true;
        }
    }

    if opts.program.is_empty() {
        bail!("fakegrind: no program given");
    }
    opts.args = argv.collect();
    Ok(opts)
}

fn render_log(opts: &Options, pid: u32) -> String {
    let mut log = String::new();
    let command = std::iter::once(&opts.program)
        .chain(opts.args.iter())
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");

    let _ = writeln!(log, "=={pid}== Memcheck, a memory error detector");
    let _ = writeln!(log, "=={pid}== Command: {command}");
    let _ = writeln!(log, "=={pid}==");
    for n in 0..opts.errors {
        let _ = writeln!(log, "=={pid}== 16 bytes in 1 blocks are definitely lost in loss record {} of {}", n + 1, opts.errors);
        let _ = writeln!(log, "=={pid}==    at 0x483877F: malloc (vg_replace_malloc.c:307)");
        let _ = writeln!(log, "=={pid}==");
    }
    if !opts.no_summary {
        let _ = writeln!(
            log,
            "=={pid}== ERROR SUMMARY: {} errors from {} contexts (suppressed: 0 from 0)",
            opts.errors, opts.contexts
        );
    }
    log
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = parse_args(std::env::args_os().skip(1))?;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let mut child = match Command::new(&opts.program).args(&opts.args).spawn() {
        Ok(child) => child,
        Err(e) => {
            eprintln!("fakegrind: cannot run {}: {e}", opts.program.to_string_lossy());
            std::process::exit(127);
        }
    };
    let child_pid = child.id().map(|p| Pid::from_raw(p as i32));

    let status = loop {
        tokio::select! {
            status = child.wait() => break status?,
            _ = sigterm.recv() => forward(child_pid, Signal::SIGTERM),
            _ = sigint.recv() => forward(child_pid, Signal::SIGINT),
        }
    };

    if let Some(ref path) = opts.log_file {
        std::fs::write(path, render_log(&opts, std::process::id()))
            .with_context(|| format!("writing {}", path.display()))?;
    }

    let code = status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(1);
    std::process::exit(code);
}

fn forward(pid: Option<Pid>, sig: Signal) {
    if let Some(pid) = pid {
        let _ = kill(pid, sig);
    }
}
