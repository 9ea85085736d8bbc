use serde::Serialize;
use thiserror::Error;

/// Where the managed dev service set is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    Absent,
    Starting,
    Running,
    Stopping,
    Restarting,
}

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("invalid transition: {0:?} -> {1:?}")]
    InvalidTransition(LifecyclePhase, LifecyclePhase),
}

#[derive(Debug)]
pub struct PhaseMachine {
    phase: LifecyclePhase,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self {
            phase: LifecyclePhase::Absent,
        }
    }
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn can_transition(&self, to: LifecyclePhase) -> bool {
        use LifecyclePhase::{Absent, Restarting, Running, Starting, Stopping};
        matches!(
            (self.phase, to),
            (Absent, Starting)
                | (Starting, Running)
                | (Starting, Absent)
                | (Running, Stopping)
                | (Running, Restarting)
                | (Stopping, Absent)
                | (Restarting, Starting)
        )
    }

    pub fn transition(&mut self, to: LifecyclePhase) -> Result<(), TransitionError> {
        if self.can_transition(to) {
            tracing::debug!("Dev service phase: {:?} -> {:?}", self.phase, to);
            self.phase = to;
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition(self.phase, to))
        }
    }

    /// Like `transition`, for callers that already hold the invariant; a
    /// violation is logged and the phase forced.
    pub(crate) fn advance(&mut self, to: LifecyclePhase) {
        if let Err(e) = self.transition(to) {
            tracing::warn!("{}", e);
            self.phase = to;
        }
    }
}
