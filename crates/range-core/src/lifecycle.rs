use crate::error::{RangeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// LifecycleState
// ---------------------------------------------------------------------------

/// Per-run lifecycle of one challenge.
///
/// Transitions:
/// ```text
/// Pending   --(deps deployed)-->      Resolving
/// Pending   --(dep failed/skipped)--> Skipped
/// Resolving --(resolve ok)-->         Applying
/// Resolving --(resolve error)-->      Failed
/// Applying  --(apply ok)-->           Deployed
/// Applying  --(apply error)-->        Failed
/// Deployed  --(teardown)-->           Destroying
/// Destroying --(destroy ok)-->        Destroyed
/// Destroying --(destroy error)-->     Failed
/// ```
///
/// A failed destroy leaves the challenge's resources standing; the ledger
/// keeps its entry so an operator can retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Pending,
    Resolving,
    Applying,
    Deployed,
    Failed,
    Skipped,
    Destroying,
    Destroyed,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Pending => "pending",
            LifecycleState::Resolving => "resolving",
            LifecycleState::Applying => "applying",
            LifecycleState::Deployed => "deployed",
            LifecycleState::Failed => "failed",
            LifecycleState::Skipped => "skipped",
            LifecycleState::Destroying => "destroying",
            LifecycleState::Destroyed => "destroyed",
        }
    }

    /// Terminal for the current run: no further transition will happen.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LifecycleState::Deployed
                | LifecycleState::Failed
                | LifecycleState::Skipped
                | LifecycleState::Destroyed
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// UnitState
// ---------------------------------------------------------------------------

/// State machine instance for one challenge in one run. Owned by the worker
/// driving that challenge; the orchestrator only observes the terminal value.
#[derive(Debug, Clone)]
pub struct UnitState {
    state: LifecycleState,
}

impl UnitState {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Pending,
        }
    }

    /// Start teardown tracking for a challenge that a previous run deployed.
    pub fn deployed() -> Self {
        Self {
            state: LifecycleState::Deployed,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Apply one transition, rejecting anything the lifecycle diagram does
    /// not allow. An `InvalidTransition` here is a scheduler bug, not a
    /// deployment failure.
    pub fn transition(&mut self, to: LifecycleState) -> Result<()> {
        use LifecycleState::*;
        let ok = matches!(
            (self.state, to),
            (Pending, Resolving)
                | (Pending, Skipped)
                | (Resolving, Applying)
                | (Resolving, Failed)
                | (Applying, Deployed)
                | (Applying, Failed)
                | (Deployed, Destroying)
                | (Destroying, Destroyed)
                | (Destroying, Failed)
        );
        if !ok {
            return Err(RangeError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        Ok(())
    }
}

impl Default for UnitState {
    fn default() -> Self {
        Self::new()
    }
}
