//! Checkpoint store.
//!
//! Append-only view over the store's checkpoint table. Sequence numbers are
//! assigned by the backing store and are gap-free per wave. Rollback never
//! mutates a wave record; it only returns the snapshot to restore from.

use std::sync::Arc;

use wave_common::{Checkpoint, NewCheckpoint, Phase, SnapshotState};

use crate::errors::StoreError;
use crate::store::WaveStore;

#[derive(Clone)]
pub struct CheckpointStore {
    store: Arc<dyn WaveStore>,
}

impl CheckpointStore {
    pub fn new(store: Arc<dyn WaveStore>) -> Self {
        Self { store }
    }

    /// Append a checkpoint and return its sequence number.
    pub fn create(
        &self,
        wave_id: &str,
        phase: Phase,
        iteration: u32,
        position: u64,
        snapshot: SnapshotState,
        rollback_eligible: bool,
    ) -> Result<u64, StoreError> {
        let checkpoint = self.store.append_checkpoint(&NewCheckpoint {
            wave_id: wave_id.to_string(),
            phase,
            iteration,
            position,
            snapshot,
            rollback_eligible,
        })?;
        tracing::debug!(
            wave_id,
            phase = %phase,
            iteration,
            sequence = checkpoint.sequence_number,
            position,
            "checkpoint written"
        );
        Ok(checkpoint.sequence_number)
    }

    pub fn list(&self, wave_id: &str) -> Result<Vec<Checkpoint>, StoreError> {
        self.store.checkpoints(wave_id)
    }

    /// Highest-sequence eligible checkpoint at or before `position`.
    pub fn last_eligible(
        &self,
        wave_id: &str,
        position: u64,
    ) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self
            .list(wave_id)?
            .into_iter()
            .filter(|c| c.rollback_eligible && c.position <= position)
            .max_by_key(|c| c.sequence_number))
    }

    /// Latest eligible checkpoint regardless of position.
    pub fn latest_eligible(&self, wave_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        self.last_eligible(wave_id, u64::MAX)
    }

    /// Snapshot of the latest eligible checkpoint.
    pub fn rollback(&self, wave_id: &str) -> Result<Option<SnapshotState>, StoreError> {
        Ok(self.latest_eligible(wave_id)?.map(|c| c.snapshot))
    }

    /// Snapshot of the latest eligible checkpoint at or before `position`.
    pub fn rollback_to(
        &self,
        wave_id: &str,
        position: u64,
    ) -> Result<Option<SnapshotState>, StoreError> {
        Ok(self.last_eligible(wave_id, position)?.map(|c| c.snapshot))
    }
}
