//! The five standard wave phases and how agents run within them.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One of the five standard phases of a wave.
///
/// Declaration order is the canonical execution order used by strategies
/// that run every phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Current state analysis
    Review,
    /// Strategy and design
    Planning,
    /// Code modification
    Implementation,
    /// Testing and verification
    Validation,
    /// Performance tuning
    Optimization,
}

impl Phase {
    /// All phases in canonical order.
    pub const ALL: [Phase; 5] = [
        Phase::Review,
        Phase::Planning,
        Phase::Implementation,
        Phase::Validation,
        Phase::Optimization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::Planning => "planning",
            Self::Implementation => "implementation",
            Self::Validation => "validation",
            Self::Optimization => "optimization",
        }
    }

    /// Identifier of this phase within a given iteration, e.g. `review.2`.
    ///
    /// These are the entries recorded in `WaveRecord::phases_completed`.
    pub fn step_id(&self, iteration: u32) -> String {
        format!("{}.{}", self.as_str(), iteration)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "review" => Ok(Self::Review),
            "planning" => Ok(Self::Planning),
            "implementation" => Ok(Self::Implementation),
            "validation" => Ok(Self::Validation),
            "optimization" => Ok(Self::Optimization),
            _ => Err(format!("Invalid phase: {}", s)),
        }
    }
}

/// How the agents assigned to a phase are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Primary and secondaries run concurrently on the same payload.
    Parallel,
    /// Primary first, its output feeds each secondary.
    Sequential,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parallel => "parallel",
            Self::Sequential => "sequential",
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parallel" => Ok(Self::Parallel),
            "sequential" => Ok(Self::Sequential),
            _ => Err(format!("Invalid execution mode: {}", s)),
        }
    }
}
