// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a remote unit, as reported by the executor.
///
/// Phases only move forward: `Pending -> Running -> (Succeeded | Failed)`.
/// `Unknown` is what an executor reports when it lost track of a unit; it is
/// never terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }

    /// Phases in which the unit has started producing output.
    pub fn is_ready_to_log(self) -> bool {
        matches!(self, Phase::Running | Phase::Succeeded | Phase::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Phase::Pending | Phase::Unknown => 0,
            Phase::Running => 1,
            Phase::Succeeded | Phase::Failed => 2,
        }
    }

    /// Compute the phase after observing `next`.
    ///
    /// A terminal phase never changes, and an observation that would move the
    /// phase backwards is ignored.
    pub fn advance(self, next: Phase) -> Phase {
        if self.is_terminal() || next.rank() < self.rank() {
            self
        } else {
            next
        }
    }

    /// Lowercase status string stored in run records.
    pub fn as_status(self) -> &'static str {
        match self {
            Phase::Pending => "pending",
            Phase::Running => "running",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
            Phase::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_status())
    }
}

/// Restart policy applied to the single container of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartPolicy {
    Always,
    OnFailure,
    Never,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::Never
    }
}

impl FromStr for RestartPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "always" => Ok(RestartPolicy::Always),
            "onfailure" | "on_failure" => Ok(RestartPolicy::OnFailure),
            "never" => Ok(RestartPolicy::Never),
            other => Err(format!(
                "invalid restart_policy: {other} (expected \"Always\", \"OnFailure\" or \"Never\")"
            )),
        }
    }
}

/// Kind of recorder backing durable run history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderKind {
    /// Records live in memory only (lost on restart).
    Memory,
    /// Records are snapshotted to a JSON file.
    File,
}

impl Default for RecorderKind {
    fn default() -> Self {
        RecorderKind::Memory
    }
}
