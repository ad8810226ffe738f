//! ProcessSupervisor
//!
//! One background task owns the child for its whole life. It scans stdout
//! for the readiness line, publishes the matched prefix through a oneshot
//! channel, keeps draining until the child exits, and returns the reaped
//! outcome as the task's result. The caller only ever observes child state
//! through those two hand-off points.

use fusevisor_common::{
    OutcomeAssertion, ProcessOutcome, SupervisorError, SupervisorResult,
};
use fusevisor_diagnostics::{DiagnosticReport, DiagnosticSession};
use fusevisor_process::force_kill_group;
use fusevisor_readiness::{ReadinessPattern, ReadinessScanner};
use fusevisor_state::{MountStateMachine, ReadinessState, StateTransition};
use parking_lot::RwLock;
use serde::Serialize;
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::SupervisorConfig;
use crate::detach::DetachRequest;

/// How long to wait for the child after SIGKILL before giving up on it.
pub const FORCE_KILL_TIMEOUT: Duration = Duration::from_secs(3);

/// What the background task hands back once the child has been reaped.
struct ChildExit {
    outcome: ProcessOutcome,
    /// Set when the stream closed before a readiness line.
    readiness_error: Option<SupervisorError>,
}

type ChildTask = JoinHandle<SupervisorResult<ChildExit>>;

/// Result of a completed `unmount()`.
#[derive(Debug, Clone, Serialize)]
pub struct UnmountReport {
    /// The child outlived the shutdown timeout and was killed.
    pub forced: bool,
    /// Time from the detach request until the child was reaped.
    pub elapsed: Duration,
    /// Parsed leak-check report, when a diagnostic wrapper was used.
    pub diagnostics: Option<DiagnosticReport>,
}

impl UnmountReport {
    /// Turn a forced shutdown into an error.
    pub fn ensure_clean(&self, id: &str, timeout: Duration) -> SupervisorResult<()> {
        if self.forced {
            return Err(SupervisorError::ForcedTermination {
                id: id.to_string(),
                timeout,
            });
        }
        Ok(())
    }
}

/// Read-only view of a supervisor's lifecycle, shareable across tasks.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    inner: Arc<RwLock<MountStateMachine>>,
}

impl StatusHandle {
    fn new(id: &str) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MountStateMachine::new(id))),
        }
    }

    pub fn state(&self) -> ReadinessState {
        self.inner.read().current_state()
    }

    pub fn history(&self) -> Vec<StateTransition> {
        self.inner.read().state_history().to_vec()
    }

    pub fn failure_reason(&self) -> Option<String> {
        self.inner.read().failure_reason().map(str::to_string)
    }

    pub fn time_to_ready(&self) -> Option<chrono::Duration> {
        self.inner.read().time_to_ready()
    }

    pub fn time_in_current_state(&self) -> chrono::Duration {
        self.inner.read().time_in_current_state()
    }

    fn update<T>(&self, f: impl FnOnce(&mut MountStateMachine) -> T) -> T {
        f(&mut self.inner.write())
    }
}

/// Supervises exactly one launch of a filesystem daemon.
///
/// `mount()`, `unmount()` and `verify()` each run once, in that order.
/// Calling one out of order fails with `InvalidState`.
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    pattern: ReadinessPattern,
    detach: Box<dyn DetachRequest>,
    status: StatusHandle,

    /// Per-run diagnostic log, kept until the supervisor is dropped.
    session: Option<DiagnosticSession>,
    task: Option<ChildTask>,
    ready_rx: Option<oneshot::Receiver<String>>,

    pid: Option<u32>,
    readiness_prefix: Option<String>,
    outcome: Option<ProcessOutcome>,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> SupervisorResult<Self> {
        config.validate()?;
        let pattern = config.pattern()?;
        let detach = config.detach.build()?;
        let status = StatusHandle::new(&config.id);

        Ok(Self {
            config,
            pattern,
            detach,
            status,
            session: None,
            task: None,
            ready_rx: None,
            pid: None,
            readiness_prefix: None,
            outcome: None,
        })
    }

    /// Replace the configured detach strategy.
    pub fn with_detach(mut self, detach: Box<dyn DetachRequest>) -> Self {
        self.detach = detach;
        self
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn state(&self) -> ReadinessState {
        self.status.state()
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    /// PID of the launched child (the wrapper, when one is configured).
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Output consumed up to and including the readiness line.
    pub fn readiness_prefix(&self) -> Option<&str> {
        self.readiness_prefix.as_deref()
    }

    /// Reaped outcome; available once the child has exited.
    pub fn outcome(&self) -> Option<&ProcessOutcome> {
        self.outcome.as_ref()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.outcome.as_ref().and_then(|o| o.exit_code)
    }

    pub fn stdout(&self) -> Option<&str> {
        self.outcome.as_ref().map(|o| o.stdout.as_str())
    }

    pub fn stderr(&self) -> Option<&str> {
        self.outcome.as_ref().map(|o| o.stderr.as_str())
    }

    pub fn diagnostic_log_path(&self) -> Option<&Path> {
        self.session.as_ref().map(DiagnosticSession::log_path)
    }

    /// Launch the daemon and wait until it announces readiness.
    ///
    /// Returns while the child keeps running. If stdout closes first, the
    /// child is reaped, the state becomes `Failed` and the error is
    /// `ReadinessTimeout` carrying everything the child printed.
    pub async fn mount(&mut self) -> SupervisorResult<()> {
        if !self.status.update(|sm| sm.can_mount()) {
            return Err(self.invalid_state("mount"));
        }
        self.status.update(|sm| sm.transition_to_starting())?;

        let child = match self.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.fail(format!("spawn failed: {e}"));
                return Err(e);
            }
        };

        let (ready_tx, ready_rx) = oneshot::channel();
        self.task = Some(tokio::spawn(watch_child(
            self.config.id.clone(),
            child,
            self.pattern.clone(),
            ready_tx,
        )));
        self.ready_rx = Some(ready_rx);

        self.await_readiness().await
    }

    /// Detach the filesystem, wait for the daemon to exit, then verify
    /// the diagnostic log.
    ///
    /// `timeout` bounds the detach request and the wait together (`None`
    /// waits forever). On timeout the child's process group is killed and
    /// the state ends as `Failed`; the diagnostic log is still verified.
    pub async fn unmount(&mut self, timeout: Option<Duration>) -> SupervisorResult<UnmountReport> {
        // A mount whose caller stopped waiting still has to settle first.
        if self.state() == ReadinessState::Starting && self.ready_rx.is_some() {
            self.await_readiness().await?;
        }
        if !self.status.update(|sm| sm.can_unmount()) {
            return Err(self.invalid_state("unmount"));
        }
        self.status.update(|sm| sm.transition_to_stopping())?;

        let pid = self.pid.ok_or_else(|| SupervisorError::channel_closed(&self.config.id))?;
        let started = Instant::now();

        info!(
            id = %self.config.id,
            target = %self.config.target,
            request = %self.detach.describe(),
            "Requesting detach"
        );
        // The detach request counts against the same bound as the join.
        let request = self.detach.detach(&self.config.target, pid);
        let detached = match timeout {
            Some(limit) => tokio::time::timeout(limit, request).await.ok(),
            None => Some(request.await),
        };
        match detached {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                warn!(id = %self.config.id, error = %e, "Detach request failed, waiting for exit anyway");
            }
            None => warn!(id = %self.config.id, "Detach request did not finish in time"),
        }
        let remaining = timeout.map(|limit| limit.saturating_sub(started.elapsed()));

        let (exit, forced) = match self.join(remaining).await {
            Ok(joined) => joined,
            Err(e) => {
                self.fail(e.to_string());
                return Err(e);
            }
        };
        let elapsed = started.elapsed();
        self.record_outcome(exit.outcome);

        if forced {
            self.fail(format!("forced termination after {:?}", timeout.unwrap_or_default()));
        } else {
            self.status.update(|sm| sm.transition_to_stopped())?;
        }
        info!(
            id = %self.config.id,
            forced,
            elapsed_ms = elapsed.as_millis() as u64,
            exit_code = ?self.exit_code(),
            "Unmounted"
        );

        let diagnostics = match self.session {
            Some(ref session) => Some(session.verify()?),
            None => None,
        };

        Ok(UnmountReport {
            forced,
            elapsed,
            diagnostics,
        })
    }

    /// Check the reaped outcome: expected exit code, non-empty stdout,
    /// empty stderr.
    pub fn verify(&self) -> Result<(), OutcomeAssertion> {
        let state = self.state();
        let outcome = match self.outcome {
            Some(ref outcome) if self.status.update(|sm| sm.can_verify()) => outcome,
            _ => {
                return Err(OutcomeAssertion::NotReaped {
                    state: state.to_string(),
                })
            }
        };

        if outcome.exit_code != Some(self.config.expected_exit_code) {
            return Err(OutcomeAssertion::ExitCode {
                expected: self.config.expected_exit_code,
                actual: outcome.exit_code,
            });
        }
        if outcome.stdout.is_empty() {
            return Err(OutcomeAssertion::EmptyStdout);
        }
        if !outcome.stderr.is_empty() {
            return Err(OutcomeAssertion::StderrNotEmpty {
                stderr: outcome.stderr.clone(),
            });
        }

        Ok(())
    }

    fn spawn(&mut self) -> SupervisorResult<Child> {
        let args: Vec<OsString> = self.config.args.iter().map(OsString::from).collect();
        let (program, argv) = match self.config.diagnostics {
            Some(ref tool) => {
                let session = tool.prepare()?;
                let wrapped = session.wrap(OsStr::new(&self.config.program), &args);
                self.session = Some(session);
                wrapped
            }
            None => (OsString::from(&self.config.program), args),
        };

        let mut cmd = Command::new(&program);
        cmd.args(&argv)
            .envs(&self.config.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref wd) = self.config.working_directory {
            cmd.current_dir(wd);
        }
        // Own process group, so a forced kill reaches a wrapper's children.
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| {
            SupervisorError::spawn_failed(program.to_string_lossy(), e.to_string())
        })?;

        let pid = child.id();
        info!(
            id = %self.config.id,
            pid = ?pid,
            command = %fusevisor_process::command_line(&program, &argv),
            "Spawned supervised process"
        );
        self.pid = pid;
        Ok(child)
    }

    async fn await_readiness(&mut self) -> SupervisorResult<()> {
        let received = match self.ready_rx.as_mut() {
            Some(rx) => rx.await,
            None => return Err(self.invalid_state("await readiness")),
        };
        self.ready_rx = None;

        match received {
            Ok(prefix) => {
                self.readiness_prefix = Some(prefix);
                self.status.update(|sm| sm.transition_to_ready())?;
                info!(
                    id = %self.config.id,
                    pid = ?self.pid,
                    time_to_ready = ?self.status.time_to_ready(),
                    "Mount ready"
                );
                Ok(())
            }
            Err(_) => {
                let err = self.reap_failed_start().await;
                self.fail(err.to_string());
                Err(err)
            }
        }
    }

    /// Collect the outcome of a child that never became ready.
    async fn reap_failed_start(&mut self) -> SupervisorError {
        // stdout is closed, but the child may linger; do not wait on it
        // forever.
        match self.join(Some(FORCE_KILL_TIMEOUT)).await {
            Ok((exit, _forced)) => {
                let err = exit.readiness_error.unwrap_or_else(|| {
                    SupervisorError::readiness_timeout(self.pattern.as_str(), exit.outcome.stdout.clone())
                });
                self.record_outcome(exit.outcome);
                err
            }
            Err(e) => e,
        }
    }

    /// Join the background task, escalating to SIGKILL after `limit`.
    ///
    /// Returns the child's exit and whether it had to be killed.
    async fn join(&mut self, limit: Option<Duration>) -> SupervisorResult<(ChildExit, bool)> {
        let id = self.config.id.clone();
        let mut task = self
            .task
            .take()
            .ok_or_else(|| SupervisorError::channel_closed(&id))?;

        let (joined, forced) = match limit {
            None => ((&mut task).await, false),
            Some(limit) => match timeout(limit, &mut task).await {
                Ok(joined) => (joined, false),
                Err(_) => {
                    warn!(%id, pid = ?self.pid, "Process did not exit within {:?}, sending SIGKILL", limit);
                    if let Some(pid) = self.pid {
                        if let Err(e) = force_kill_group(pid) {
                            error!(%id, pid, error = %e, "Failed to kill process group");
                        }
                    }

                    match timeout(FORCE_KILL_TIMEOUT, &mut task).await {
                        Ok(joined) => (joined, true),
                        Err(_) => {
                            error!(%id, pid = ?self.pid, "Process survived SIGKILL");
                            return Err(SupervisorError::Unkillable {
                                id,
                                pid: self.pid.unwrap_or_default(),
                                timeout: FORCE_KILL_TIMEOUT,
                            });
                        }
                    }
                }
            },
        };

        let exit = joined.map_err(|e| SupervisorError::task_panic(&id, e.to_string()))??;
        debug!(%id, exit_code = ?exit.outcome.exit_code, signal = ?exit.outcome.signal, forced, "Child reaped");
        Ok((exit, forced))
    }

    fn record_outcome(&mut self, outcome: ProcessOutcome) {
        self.outcome = Some(outcome);
    }

    fn fail(&self, reason: String) {
        if let Err(e) = self.status.update(|sm| sm.transition_to_failed(reason)) {
            debug!(id = %self.config.id, error = %e, "State already terminal");
        }
    }

    fn invalid_state(&self, operation: &str) -> SupervisorError {
        SupervisorError::invalid_state(&self.config.id, operation, self.state())
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if !self.state().has_live_child() {
            return;
        }
        if let Some(pid) = self.pid {
            warn!(
                id = %self.config.id,
                pid,
                state = %self.state(),
                "Supervisor dropped with a live child, killing process group"
            );
            if let Err(e) = force_kill_group(pid) {
                error!(id = %self.config.id, pid, error = %e, "Failed to kill process group on drop");
            }
        }
    }
}

/// Body of the background task.
async fn watch_child(
    id: String,
    mut child: Child,
    pattern: ReadinessPattern,
    ready_tx: oneshot::Sender<String>,
) -> SupervisorResult<ChildExit> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SupervisorError::channel_closed(&id))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| SupervisorError::channel_closed(&id))?;

    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr.read_to_end(&mut buf).await?;
        Ok::<_, std::io::Error>(String::from_utf8_lossy(&buf).into_owned())
    });

    let mut scanner = ReadinessScanner::new(BufReader::new(stdout));
    let readiness_error = match scanner.scan(&pattern).await {
        Ok(prefix) => {
            if ready_tx.send(prefix).is_err() {
                debug!(%id, "Nobody waiting for readiness");
            }
            None
        }
        Err(e) => {
            warn!(%id, error = %e, "Process closed stdout before readiness");
            drop(ready_tx);
            Some(e)
        }
    };

    let stdout = scanner.drain().await?;
    let status = child.wait().await?;
    let stderr = stderr_task
        .await
        .map_err(|e| SupervisorError::task_panic(&id, e.to_string()))??;

    info!(%id, status = %status, "Supervised process exited");

    Ok(ChildExit {
        outcome: ProcessOutcome::from_status(status, stdout, stderr),
        readiness_error,
    })
}
