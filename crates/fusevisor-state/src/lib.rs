use chrono::{DateTime, Utc};
use fusevisor_common::{SupervisorError, SupervisorResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a supervised mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadinessState {
    /// `mount()` has not been called yet
    NotStarted,
    /// Child launched, waiting for the readiness announcement
    Starting,
    /// Readiness announced, child running
    Ready,
    /// Detach requested, waiting for the child to exit
    Stopping,
    /// Child exited on its own and was reaped
    Stopped,
    /// Readiness never arrived, or the child had to be killed
    Failed,
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessState::NotStarted => write!(f, "not_started"),
            ReadinessState::Starting => write!(f, "starting"),
            ReadinessState::Ready => write!(f, "ready"),
            ReadinessState::Stopping => write!(f, "stopping"),
            ReadinessState::Stopped => write!(f, "stopped"),
            ReadinessState::Failed => write!(f, "failed"),
        }
    }
}

impl ReadinessState {
    /// Check if the state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReadinessState::Stopped | ReadinessState::Failed)
    }

    /// Check if a child process may still be alive in this state
    pub fn has_live_child(&self) -> bool {
        matches!(
            self,
            ReadinessState::Starting | ReadinessState::Ready | ReadinessState::Stopping
        )
    }
}

/// State machine for one mount lifetime.
///
/// There is exactly one readiness transition and one shutdown transition per
/// lifetime; there is no way back out of `Stopped` or `Failed`.
#[derive(Debug, Clone)]
pub struct MountStateMachine {
    mount_id: String,
    current_state: ReadinessState,
    previous_state: Option<ReadinessState>,
    state_history: Vec<StateTransition>,
    last_transition_time: DateTime<Utc>,
}

/// Represents a state transition with timestamp and optional reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: ReadinessState,
    pub to_state: ReadinessState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

impl MountStateMachine {
    pub fn new(mount_id: &str) -> Self {
        Self {
            mount_id: mount_id.to_string(),
            current_state: ReadinessState::NotStarted,
            previous_state: None,
            state_history: Vec::new(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn mount_id(&self) -> &str {
        &self.mount_id
    }

    pub fn current_state(&self) -> ReadinessState {
        self.current_state
    }

    pub fn previous_state(&self) -> Option<ReadinessState> {
        self.previous_state
    }

    pub fn state_history(&self) -> &[StateTransition] {
        &self.state_history
    }

    pub fn last_transition_time(&self) -> DateTime<Utc> {
        self.last_transition_time
    }

    /// Check if a transition from the current state to `target_state` is valid
    pub fn is_valid_transition(&self, target_state: ReadinessState) -> bool {
        matches!(
            (self.current_state, target_state),
            (ReadinessState::NotStarted, ReadinessState::Starting)
                | (ReadinessState::Starting, ReadinessState::Ready)
                | (ReadinessState::Starting, ReadinessState::Failed)
                | (ReadinessState::Ready, ReadinessState::Stopping)
                | (ReadinessState::Stopping, ReadinessState::Stopped)
                | (ReadinessState::Stopping, ReadinessState::Failed)
        )
    }

    /// Transition to a new state with optional reason
    pub fn transition_to(
        &mut self,
        target_state: ReadinessState,
        reason: Option<String>,
    ) -> SupervisorResult<()> {
        if !self.is_valid_transition(target_state) {
            return Err(SupervisorError::invalid_state(
                &self.mount_id,
                format!("transition to {}", target_state),
                self.current_state,
            ));
        }

        let from_state = self.current_state;
        let now = Utc::now();
        self.state_history.push(StateTransition {
            from_state,
            to_state: target_state,
            timestamp: now,
            reason,
        });
        self.previous_state = Some(from_state);
        self.current_state = target_state;
        self.last_transition_time = now;

        tracing::debug!(
            "Mount {} transitioned from {} to {}",
            self.mount_id,
            from_state,
            target_state
        );

        Ok(())
    }

    pub fn transition_to_starting(&mut self) -> SupervisorResult<()> {
        self.transition_to(ReadinessState::Starting, Some("Mount requested".to_string()))
    }

    pub fn transition_to_ready(&mut self) -> SupervisorResult<()> {
        self.transition_to(ReadinessState::Ready, Some("Readiness announced".to_string()))
    }

    pub fn transition_to_stopping(&mut self) -> SupervisorResult<()> {
        self.transition_to(ReadinessState::Stopping, Some("Unmount requested".to_string()))
    }

    pub fn transition_to_stopped(&mut self) -> SupervisorResult<()> {
        self.transition_to(ReadinessState::Stopped, Some("Process exited and reaped".to_string()))
    }

    pub fn transition_to_failed(&mut self, reason: String) -> SupervisorResult<()> {
        self.transition_to(ReadinessState::Failed, Some(reason))
    }

    pub fn can_mount(&self) -> bool {
        self.current_state == ReadinessState::NotStarted
    }

    pub fn can_unmount(&self) -> bool {
        self.current_state == ReadinessState::Ready
    }

    pub fn can_verify(&self) -> bool {
        self.current_state.is_terminal()
    }

    pub fn time_in_current_state(&self) -> chrono::Duration {
        Utc::now() - self.last_transition_time
    }

    /// Reason recorded for the `Failed` transition, if any
    pub fn failure_reason(&self) -> Option<&str> {
        self.state_history
            .iter()
            .rev()
            .find(|t| t.to_state == ReadinessState::Failed)
            .and_then(|t| t.reason.as_deref())
    }

    /// Time from `Starting` to `Ready`, once readiness has been reached
    pub fn time_to_ready(&self) -> Option<chrono::Duration> {
        let started = self
            .state_history
            .iter()
            .find(|t| t.to_state == ReadinessState::Starting)?;
        let ready = self
            .state_history
            .iter()
            .find(|t| t.to_state == ReadinessState::Ready)?;
        Some(ready.timestamp - started.timestamp)
    }
}
