//! Wave persistence.
//!
//! Three logical tables back every wave:
//!
//! | Table              | Key                          | Mutability                 |
//! |--------------------|------------------------------|----------------------------|
//! | `waves`            | `wave_id`                    | updated once per transition |
//! | `phase_executions` | row per attempt              | append-only                |
//! | `checkpoints`      | (`wave_id`, `sequence_number`) | append-only              |
//!
//! Writes are synchronous; the orchestrator calls them between agent
//! invocations, never while one is in flight.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use wave_common::{Checkpoint, NewCheckpoint, PhaseExecution, WaveRecord};

use crate::errors::StoreError;

/// Storage backend for waves, phase executions and checkpoints.
pub trait WaveStore: Send + Sync {
    /// Insert a new wave record. Fails with `DuplicateWave` if the id exists.
    fn insert_wave(&self, record: &WaveRecord) -> Result<(), StoreError>;

    /// Replace an existing wave record.
    fn update_wave(&self, record: &WaveRecord) -> Result<(), StoreError>;

    fn get_wave(&self, wave_id: &str) -> Result<Option<WaveRecord>, StoreError>;

    /// All waves, oldest first.
    fn list_waves(&self) -> Result<Vec<WaveRecord>, StoreError>;

    fn insert_phase_execution(&self, execution: &PhaseExecution) -> Result<(), StoreError>;

    /// Phase executions of a wave in insertion order.
    fn phase_executions(&self, wave_id: &str) -> Result<Vec<PhaseExecution>, StoreError>;

    /// Append a checkpoint with the wave's next sequence number.
    fn append_checkpoint(&self, checkpoint: &NewCheckpoint) -> Result<Checkpoint, StoreError>;

    /// Checkpoints of a wave in sequence order.
    fn checkpoints(&self, wave_id: &str) -> Result<Vec<Checkpoint>, StoreError>;
}
