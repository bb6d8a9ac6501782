//! Wave contexts, records, phase executions, checkpoints and outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::time::Duration;

use crate::agent::{AgentFault, AgentKind};
use crate::phase::{ExecutionMode, Phase};

/// Orchestration strategy for a wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Iterative enhancement over a reduced phase list
    Progressive,
    /// Every phase once, in order
    Systematic,
    /// Phase list recomputed from residual complexity each iteration
    Adaptive,
    /// Large-scale: every phase, continuous checkpointing, fan-out
    Enterprise,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Progressive => "progressive",
            Self::Systematic => "systematic",
            Self::Adaptive => "adaptive",
            Self::Enterprise => "enterprise",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "progressive" => Ok(Self::Progressive),
            "systematic" => Ok(Self::Systematic),
            "adaptive" => Ok(Self::Adaptive),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(format!(
                "Invalid strategy '{}'. Valid values: progressive, systematic, adaptive, enterprise",
                s
            )),
        }
    }
}

/// When checkpoints are written during a wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointGranularity {
    /// After every phase step (enterprise).
    Continuous,
    /// After every phase.
    PerPhase,
    /// After the last phase of each iteration.
    PerIteration,
    /// After every step of an adaptive iteration.
    AdaptiveStep,
}

impl CheckpointGranularity {
    /// Whether a checkpoint follows a succeeded phase at this position.
    pub fn checkpoint_after(&self, last_in_iteration: bool) -> bool {
        match self {
            Self::Continuous | Self::PerPhase | Self::AdaptiveStep => true,
            Self::PerIteration => last_in_iteration,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continuous => "continuous",
            Self::PerPhase => "per_phase",
            Self::PerIteration => "per_iteration",
            Self::AdaptiveStep => "adaptive_step",
        }
    }
}

impl std::fmt::Display for CheckpointGranularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the complexity analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexitySignal {
    pub complexity_score: f64,
    pub file_count: usize,
    pub operation_types: BTreeSet<String>,
    pub domains: BTreeSet<String>,
}

/// Generate a fresh wave identifier.
pub fn generate_wave_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Reasons a wave context is malformed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContextError {
    #[error("wave_id must not be empty")]
    EmptyWaveId,

    #[error("complexity_score {0} is outside [0, 1]")]
    ScoreOutOfRange(f64),
}

/// Immutable input to a wave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveContext {
    pub wave_id: String,
    pub strategy: Strategy,
    pub complexity_score: f64,
    pub file_count: usize,
    pub operation_types: BTreeSet<String>,
    pub domains: BTreeSet<String>,
}

impl WaveContext {
    /// Build a context from an analyzed signal. A missing id is generated.
    pub fn new(wave_id: Option<String>, strategy: Strategy, signal: ComplexitySignal) -> Self {
        Self {
            wave_id: wave_id.unwrap_or_else(generate_wave_id),
            strategy,
            complexity_score: signal.complexity_score,
            file_count: signal.file_count,
            operation_types: signal.operation_types,
            domains: signal.domains,
        }
    }

    /// The complexity signal this context was built from.
    pub fn signal(&self) -> ComplexitySignal {
        ComplexitySignal {
            complexity_score: self.complexity_score,
            file_count: self.file_count,
            operation_types: self.operation_types.clone(),
            domains: self.domains.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ContextError> {
        if self.wave_id.trim().is_empty() {
            return Err(ContextError::EmptyWaveId);
        }
        if !self.complexity_score.is_finite() || !(0.0..=1.0).contains(&self.complexity_score) {
            return Err(ContextError::ScoreOutOfRange(self.complexity_score));
        }
        Ok(())
    }
}

/// Lifecycle status of a wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveStatus {
    InProgress,
    Completed,
    Partial,
    Failed,
    Cancelled,
}

impl WaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl std::fmt::Display for WaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WaveStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid wave status: {}", s)),
        }
    }
}

/// A fault recorded against a wave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WaveFault {
    /// An agent invocation failed; recovered or not.
    Agent(AgentFault),
    /// Every attempt of a phase failed.
    PhaseFailure {
        phase: Phase,
        iteration: u32,
        attempts: u32,
    },
    /// The store rejected a checkpoint write.
    CheckpointWrite { phase: Phase, message: String },
    /// Any other persistence failure during a run.
    Persistence { message: String },
    /// The wave was cancelled; `phase` is the in-flight phase, if any.
    Cancelled { phase: Option<Phase> },
}

impl WaveFault {
    pub fn as_agent(&self) -> Option<&AgentFault> {
        match self {
            Self::Agent(fault) => Some(fault),
            _ => None,
        }
    }
}

/// Mutable execution state of a wave, owned by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveRecord {
    pub wave_id: String,
    pub strategy: Strategy,
    pub status: WaveStatus,
    /// Step ids (`phase.iteration`) that finished successfully, in order.
    pub phases_completed: Vec<String>,
    /// Iterations started so far.
    #[serde(default)]
    pub iterations_run: u32,
    #[serde(default)]
    pub faults: Vec<WaveFault>,
    /// Score of the context the wave started from.
    #[serde(default)]
    pub complexity_score: f64,
    #[serde(default)]
    pub file_count: usize,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl WaveRecord {
    pub fn start(context: &WaveContext) -> Self {
        Self {
            wave_id: context.wave_id.clone(),
            strategy: context.strategy,
            status: WaveStatus::InProgress,
            phases_completed: Vec::new(),
            iterations_run: 0,
            faults: Vec::new(),
            complexity_score: context.complexity_score,
            file_count: context.file_count,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// Wall-clock time from start to end; `None` while the wave runs.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}

/// Result status of one phase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("Invalid phase status: {}", s)),
        }
    }
}

/// One attempt at one phase. Never mutated after it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseExecution {
    pub wave_id: String,
    pub phase: Phase,
    pub iteration: u32,
    pub attempt: u32,
    pub agents_invoked: Vec<AgentKind>,
    pub execution_mode: ExecutionMode,
    pub status: PhaseStatus,
    #[serde(with = "crate::duration_serde")]
    pub duration: Duration,
    pub result_summary: Value,
    #[serde(default)]
    pub faults: Vec<AgentFault>,
}

/// Wave state captured at a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotState {
    pub record: WaveRecord,
    /// Cumulative phase summaries keyed by step id.
    pub phase_results: BTreeMap<String, Value>,
}

/// A checkpoint about to be appended; the store assigns the sequence number.
#[derive(Debug, Clone)]
pub struct NewCheckpoint {
    pub wave_id: String,
    pub phase: Phase,
    pub iteration: u32,
    pub position: u64,
    pub snapshot: SnapshotState,
    pub rollback_eligible: bool,
}

/// A durable snapshot taken at a phase boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub wave_id: String,
    pub phase: Phase,
    pub iteration: u32,
    /// Monotonic per wave, starting at 0.
    pub sequence_number: u64,
    /// Index of the phase step within the wave's executed sequence.
    pub position: u64,
    pub snapshot: SnapshotState,
    pub rollback_eligible: bool,
    pub created_at: DateTime<Utc>,
}

/// What the caller receives once a wave reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveOutcome {
    pub wave_id: String,
    pub strategy: Strategy,
    pub status: WaveStatus,
    pub phases_completed: Vec<String>,
    pub final_checkpoint: Option<u64>,
    pub faults: Vec<WaveFault>,
    pub iterations_run: u32,
}

impl WaveOutcome {
    pub fn from_record(record: &WaveRecord, final_checkpoint: Option<u64>) -> Self {
        Self {
            wave_id: record.wave_id.clone(),
            strategy: record.strategy,
            status: record.status,
            phases_completed: record.phases_completed.clone(),
            final_checkpoint,
            faults: record.faults.clone(),
            iterations_run: record.iterations_run,
        }
    }

    /// Agent faults recorded during the wave.
    pub fn agent_faults(&self) -> impl Iterator<Item = &AgentFault> {
        self.faults.iter().filter_map(WaveFault::as_agent)
    }
}
