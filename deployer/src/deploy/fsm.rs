//! Finite State Machine for one deployment flow

use serde::{Deserialize, Serialize};

use crate::models::result::StrategyKind;

/// How a flow ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    Success,
    AllFailed,
}

/// Deployment state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    /// Nothing started yet
    Init,

    /// Materializing source
    Fetching,

    /// Writing the deployment descriptor
    ConfiguringDescriptor,

    /// Running a strategy's deploy step
    Attempting(StrategyKind),

    /// Terminal
    Done(Completion),
}

/// Deployment event
#[derive(Debug, Clone, Copy)]
pub enum DeploymentEvent {
    /// Start fetching source
    Fetch,

    /// Start writing the descriptor
    Configure,

    /// Start a strategy's deploy step
    Attempt(StrategyKind),

    /// The flow produced a successful result
    Succeed,

    /// Every strategy failed
    Exhaust,
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentState,
    trail: Vec<DeploymentState>,
}

impl DeploymentFsm {
    /// Create a new FSM in the initial state
    pub fn new() -> Self {
        Self {
            state: DeploymentState::Init,
            trail: vec![DeploymentState::Init],
        }
    }

    /// Get current state
    pub fn state(&self) -> DeploymentState {
        self.state
    }

    /// Every state visited, in order
    pub fn trail(&self) -> &[DeploymentState] {
        &self.trail
    }

    /// Strategies whose deploy step was entered, in order
    pub fn attempted(&self) -> Vec<StrategyKind> {
        self.trail
            .iter()
            .filter_map(|state| match state {
                DeploymentState::Attempting(kind) => Some(*kind),
                _ => None,
            })
            .collect()
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, DeploymentState::Done(_))
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<(), String> {
        use DeploymentState::*;

        let new_state = match (&self.state, &event) {
            // A strategy may fail at any phase and the next one fetches again
            (
                Init | Fetching | ConfiguringDescriptor | Attempting(_),
                DeploymentEvent::Fetch,
            ) => Fetching,

            (Fetching, DeploymentEvent::Configure) => ConfiguringDescriptor,

            (
                Init | Fetching | ConfiguringDescriptor | Attempting(_),
                DeploymentEvent::Attempt(kind),
            ) => Attempting(*kind),

            (Attempting(_), DeploymentEvent::Succeed) => Done(Completion::Success),

            (
                Init | Fetching | ConfiguringDescriptor | Attempting(_),
                DeploymentEvent::Exhaust,
            ) => Done(Completion::AllFailed),

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        self.trail.push(new_state);
        Ok(())
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
