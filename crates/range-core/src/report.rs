use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::lifecycle::LifecycleState;

// ---------------------------------------------------------------------------
// RunMode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Deploy,
    Destroy,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunMode::Deploy => "deploy",
            RunMode::Destroy => "destroy",
        })
    }
}

// ---------------------------------------------------------------------------
// UnitError / FailureKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Placeholder resolution failed.
    Resolve,
    /// The adapter's apply reported failure.
    Apply,
    /// The adapter's destroy reported failure.
    Destroy,
    /// The per-unit timeout fired.
    Timeout,
    /// The run was cancelled before or during this unit.
    Cancelled,
    /// An upstream dependency failed or was skipped.
    DependencyFailed,
}

/// Why a challenge did not reach its success state. Every non-success
/// terminal report carries one; nothing fails silently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitError {
    pub kind: FailureKind,
    pub detail: String,
}

impl UnitError {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for UnitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.detail)
    }
}

// ---------------------------------------------------------------------------
// UnitReport / RunReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitReport {
    pub id: String,
    pub state: LifecycleState,
    /// True when the skip optimization reused prior outputs without an apply.
    #[serde(default)]
    pub reused: bool,
    pub duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<UnitError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Terminal report per requested challenge, in scheduling order.
    pub units: Vec<UnitReport>,
    /// Output store contents at run end.
    pub outputs: BTreeMap<String, BTreeMap<String, Value>>,
}

impl RunReport {
    /// Full success: every requested challenge reached Deployed (deploy
    /// mode) or Destroyed (destroy mode, where never-deployed is a no-op
    /// counted as success).
    pub fn succeeded(&self) -> bool {
        let goal = match self.mode {
            RunMode::Deploy => LifecycleState::Deployed,
            RunMode::Destroy => LifecycleState::Destroyed,
        };
        self.units.iter().all(|u| u.state == goal)
    }

    pub fn unit(&self, id: &str) -> Option<&UnitReport> {
        self.units.iter().find(|u| u.id == id)
    }

    /// `(state, count)` pairs for the summary line, in state order.
    pub fn state_counts(&self) -> Vec<(LifecycleState, usize)> {
        let mut counts: BTreeMap<&'static str, (LifecycleState, usize)> = BTreeMap::new();
        for u in &self.units {
            counts
                .entry(u.state.as_str())
                .or_insert((u.state, 0))
                .1 += 1;
        }
        counts.into_values().collect()
    }
}
