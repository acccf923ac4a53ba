use benchvisor_common::errors::{ProcessError, ProcessResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one supervised instance, from spawn to teardown.
///
/// ```text
/// NotStarted ──────────────────────────────────────────────┐
///     │                                                     │
///  Running ── GracefulSignalSent ──┬── Exited ── CleanedUp ◄┘
///     │                            │     ▲
///     │                       ForceKillSent
///     └── Exited (process ended on its own)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceState {
    /// Descriptor exists (directories may exist) but no process was spawned
    NotStarted,
    /// Process was spawned and has not been asked to stop
    Running,
    /// SIGTERM was delivered; waiting for the grace deadline
    GracefulSignalSent,
    /// Grace deadline elapsed; SIGKILL was delivered
    ForceKillSent,
    /// Process is gone and reaped
    Exited,
    /// Ephemeral directories removed; nothing left to release
    CleanedUp,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceState::NotStarted => write!(f, "not_started"),
            InstanceState::Running => write!(f, "running"),
            InstanceState::GracefulSignalSent => write!(f, "graceful_signal_sent"),
            InstanceState::ForceKillSent => write!(f, "force_kill_sent"),
            InstanceState::Exited => write!(f, "exited"),
            InstanceState::CleanedUp => write!(f, "cleaned_up"),
        }
    }
}

impl InstanceState {
    /// Whether the process may still be alive in this state
    pub fn may_be_running(&self) -> bool {
        matches!(
            self,
            InstanceState::Running | InstanceState::GracefulSignalSent | InstanceState::ForceKillSent
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceState::CleanedUp)
    }
}

/// State machine enforcing the legal shutdown transitions of an instance
#[derive(Debug, Clone)]
pub struct InstanceStateMachine {
    instance: String,
    current_state: InstanceState,
    state_history: Vec<StateTransition>,
    last_transition_time: DateTime<Utc>,
}

/// A recorded state transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: InstanceState,
    pub to_state: InstanceState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

impl InstanceStateMachine {
    pub fn new(instance: &str) -> Self {
        Self {
            instance: instance.to_string(),
            current_state: InstanceState::NotStarted,
            state_history: Vec::new(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn current_state(&self) -> InstanceState {
        self.current_state
    }

    pub fn state_history(&self) -> &[StateTransition] {
        &self.state_history
    }

    pub fn last_transition_time(&self) -> DateTime<Utc> {
        self.last_transition_time
    }

    /// Check if a transition from the current state to `target` is legal
    pub fn is_valid_transition(&self, target: InstanceState) -> bool {
        use InstanceState::*;

        matches!(
            (self.current_state, target),
            (NotStarted, Running)
                | (NotStarted, CleanedUp)
                | (Running, GracefulSignalSent)
                | (Running, Exited)
                | (GracefulSignalSent, Exited)
                | (GracefulSignalSent, ForceKillSent)
                | (ForceKillSent, Exited)
                | (Exited, CleanedUp)
        )
    }

    pub fn transition_to(&mut self, target: InstanceState, reason: Option<String>) -> ProcessResult<()> {
        if !self.is_valid_transition(target) {
            return Err(ProcessError::invalid_transition(
                &self.instance,
                self.current_state.to_string(),
                target.to_string(),
            ));
        }

        let now = Utc::now();
        self.state_history.push(StateTransition {
            from_state: self.current_state,
            to_state: target,
            timestamp: now,
            reason,
        });

        tracing::debug!(
            "Instance {} transitioned from {} to {}",
            self.instance,
            self.current_state,
            target
        );

        self.current_state = target;
        self.last_transition_time = now;
        Ok(())
    }

    pub fn mark_running(&mut self) -> ProcessResult<()> {
        self.transition_to(InstanceState::Running, Some("Process spawned".to_string()))
    }

    pub fn mark_graceful_signal_sent(&mut self) -> ProcessResult<()> {
        self.transition_to(InstanceState::GracefulSignalSent, Some("SIGTERM sent".to_string()))
    }

    pub fn mark_force_kill_sent(&mut self) -> ProcessResult<()> {
        self.transition_to(
            InstanceState::ForceKillSent,
            Some("Grace deadline elapsed, SIGKILL sent".to_string()),
        )
    }

    pub fn mark_exited(&mut self, reason: String) -> ProcessResult<()> {
        self.transition_to(InstanceState::Exited, Some(reason))
    }

    pub fn mark_cleaned_up(&mut self) -> ProcessResult<()> {
        self.transition_to(InstanceState::CleanedUp, Some("Ephemeral paths removed".to_string()))
    }

    /// Whether the instance ever passed through `state`
    pub fn visited(&self, state: InstanceState) -> bool {
        self.current_state == state || self.state_history.iter().any(|t| t.from_state == state)
    }

    /// Ordered list of states visited so far, starting with `NotStarted`
    pub fn path(&self) -> Vec<InstanceState> {
        let mut path = vec![InstanceState::NotStarted];
        path.extend(self.state_history.iter().map(|t| t.to_state));
        path
    }
}
