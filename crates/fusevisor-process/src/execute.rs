//! Run a command to completion.
//!
//! Captures stdout and stderr as text. With a diagnostic tool configured the
//! command runs under the wrapper and the wrapper's log is verified after
//! exit.

use fusevisor_common::{ProcessOutcome, SupervisorError, SupervisorResult};
use fusevisor_diagnostics::DiagnosticTool;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Options for [`run`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Run under this wrapper and verify its log afterwards.
    pub diagnostics: Option<DiagnosticTool>,
    /// Fail with `CommandFailed` unless the command exits with code 0.
    pub check: bool,
    pub working_directory: Option<PathBuf>,
}

impl RunOptions {
    pub fn checked() -> Self {
        Self {
            check: true,
            ..Default::default()
        }
    }

    pub fn with_diagnostics(mut self, tool: DiagnosticTool) -> Self {
        self.diagnostics = Some(tool);
        self
    }
}

/// Run `program args...` and capture its output.
pub async fn run<P, S>(program: P, args: &[S], options: &RunOptions) -> SupervisorResult<ProcessOutcome>
where
    P: AsRef<OsStr>,
    S: AsRef<OsStr>,
{
    let session = options
        .diagnostics
        .as_ref()
        .map(DiagnosticTool::prepare)
        .transpose()?;

    let (program, argv): (OsString, Vec<OsString>) = match &session {
        Some(session) => session.wrap(program.as_ref(), args),
        None => (
            program.as_ref().to_os_string(),
            args.iter().map(|a| a.as_ref().to_os_string()).collect(),
        ),
    };

    let cmdline = command_line(&program, &argv);
    info!("Running '{}'", cmdline);

    let mut cmd = Command::new(&program);
    cmd.args(&argv)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(ref wd) = options.working_directory {
        cmd.current_dir(wd);
    }

    let output = cmd
        .output()
        .await
        .map_err(|e| SupervisorError::spawn_failed(program.to_string_lossy(), e.to_string()))?;

    let outcome = ProcessOutcome::from_status(
        output.status,
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
    );
    debug!(
        exit_code = ?outcome.exit_code,
        signal = ?outcome.signal,
        "Command '{}' finished",
        cmdline
    );

    if options.check && !outcome.success() {
        return Err(SupervisorError::CommandFailed {
            command: cmdline,
            exit_code: outcome.exit_code,
            signal: outcome.signal,
        });
    }

    if let Some(session) = session {
        session.verify()?;
    }

    Ok(outcome)
}

/// Render a command line for logs and error messages.
pub fn command_line(program: &OsStr, args: &[OsString]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(OsString::as_os_str))
        .map(|s| s.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
