//! Shared domain types for the wave orchestration engine.
//!
//! Everything that crosses a component boundary lives here: the five
//! standard phases, worker agent identities and their invocation contract,
//! wave contexts and records, checkpoints, and the fault taxonomy recorded
//! in a wave outcome.

pub mod agent;
pub mod phase;
pub mod wave;

mod duration_serde;

pub use agent::{AgentFault, AgentKind, AgentOutput, FaultKind, WorkerAgent};
pub use phase::{ExecutionMode, Phase};
pub use wave::{
    Checkpoint, CheckpointGranularity, ComplexitySignal, ContextError, NewCheckpoint,
    PhaseExecution, PhaseStatus, SnapshotState, Strategy, WaveContext, WaveFault, WaveOutcome,
    WaveRecord, WaveStatus, generate_wave_id,
};
