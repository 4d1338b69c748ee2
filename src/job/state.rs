//! Lifecycle of one invocation: `Idle → Running → {Continuing | Completed | Failed}`.
//!
//! The machine logs every transition and rejects leaving a terminal state.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error};

/// Per-invocation job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Invocation received, nothing resolved yet
    #[default]
    Idle,
    /// Iterating the work sequence
    Running,
    /// Time budget reached, continuation handed off
    Continuing,
    /// Work sequence exhausted
    Completed,
    /// Unrecoverable fetch error
    Failed,
}

impl JobState {
    /// Check if this is a terminal state for the invocation
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Continuing | Self::Completed | Self::Failed)
    }

    /// Check if the chain ends with this state
    pub fn ends_chain(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Continuing)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Continuing => write!(f, "continuing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            "continuing" => Ok(Self::Continuing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid job state: {s}")),
        }
    }
}

/// Tracks the state of a single invocation
#[derive(Debug)]
pub struct JobStateMachine {
    job: String,
    state: JobState,
}

impl JobStateMachine {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            state: JobState::Idle,
        }
    }

    pub fn current(&self) -> JobState {
        self.state
    }

    /// Move to `next`; invalid transitions are logged and leave the state unchanged
    pub fn transition_to(&mut self, next: JobState) -> bool {
        if !self.state.can_transition_to(next) {
            error!(
                job = %self.job,
                from = %self.state,
                to = %next,
                "Rejected invalid job state transition"
            );
            return false;
        }

        debug!(job = %self.job, from = %self.state, to = %next, "Job state transition");
        self.state = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Idle.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Continuing.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());

        assert!(!JobState::Continuing.ends_chain());
        assert!(JobState::Completed.ends_chain());
    }

    #[test]
    fn test_transition_rules() {
        assert!(JobState::Idle.can_transition_to(JobState::Running));
        assert!(JobState::Running.can_transition_to(JobState::Continuing));
        assert!(!JobState::Idle.can_transition_to(JobState::Completed));
        assert!(!JobState::Completed.can_transition_to(JobState::Running));
        assert!(!JobState::Continuing.can_transition_to(JobState::Running));
    }

    #[test]
    fn test_state_machine_rejects_invalid_transition() {
        let mut machine = JobStateMachine::new("sweep");
        assert!(!machine.transition_to(JobState::Completed));
        assert_eq!(machine.current(), JobState::Idle);

        assert!(machine.transition_to(JobState::Running));
        assert!(machine.transition_to(JobState::Completed));
        assert_eq!(machine.current(), JobState::Completed);
    }

    #[test]
    fn test_round_trip_display() {
        for state in [
            JobState::Idle,
            JobState::Running,
            JobState::Continuing,
            JobState::Completed,
            JobState::Failed,
        ] {
            assert_eq!(state.to_string().parse::<JobState>().unwrap(), state);
        }
        assert!("bogus".parse::<JobState>().is_err());
    }
}
