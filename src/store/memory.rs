use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use wave_common::{Checkpoint, NewCheckpoint, PhaseExecution, WaveRecord};

use super::WaveStore;
use crate::errors::StoreError;

#[derive(Default)]
struct Tables {
    /// Insertion order of wave ids.
    order: Vec<String>,
    waves: HashMap<String, WaveRecord>,
    executions: HashMap<String, Vec<PhaseExecution>>,
    checkpoints: HashMap<String, Vec<Checkpoint>>,
}

/// Process-local store. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

fn not_found(wave_id: &str) -> StoreError {
    StoreError::WaveNotFound {
        wave_id: wave_id.to_string(),
    }
}

impl WaveStore for MemoryStore {
    fn insert_wave(&self, record: &WaveRecord) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.waves.contains_key(&record.wave_id) {
            return Err(StoreError::DuplicateWave {
                wave_id: record.wave_id.clone(),
            });
        }
        tables.order.push(record.wave_id.clone());
        tables.waves.insert(record.wave_id.clone(), record.clone());
        Ok(())
    }

    fn update_wave(&self, record: &WaveRecord) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let slot = tables
            .waves
            .get_mut(&record.wave_id)
            .ok_or_else(|| not_found(&record.wave_id))?;
        *slot = record.clone();
        Ok(())
    }

    fn get_wave(&self, wave_id: &str) -> Result<Option<WaveRecord>, StoreError> {
        Ok(self.lock()?.waves.get(wave_id).cloned())
    }

    fn list_waves(&self) -> Result<Vec<WaveRecord>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .order
            .iter()
            .filter_map(|id| tables.waves.get(id).cloned())
            .collect())
    }

    fn insert_phase_execution(&self, execution: &PhaseExecution) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if !tables.waves.contains_key(&execution.wave_id) {
            return Err(not_found(&execution.wave_id));
        }
        tables
            .executions
            .entry(execution.wave_id.clone())
            .or_default()
            .push(execution.clone());
        Ok(())
    }

    fn phase_executions(&self, wave_id: &str) -> Result<Vec<PhaseExecution>, StoreError> {
        Ok(self
            .lock()?
            .executions
            .get(wave_id)
            .cloned()
            .unwrap_or_default())
    }

    fn append_checkpoint(&self, checkpoint: &NewCheckpoint) -> Result<Checkpoint, StoreError> {
        let mut tables = self.lock()?;
        if !tables.waves.contains_key(&checkpoint.wave_id) {
            return Err(not_found(&checkpoint.wave_id));
        }
        let list = tables
            .checkpoints
            .entry(checkpoint.wave_id.clone())
            .or_default();
        let stored = Checkpoint {
            wave_id: checkpoint.wave_id.clone(),
            phase: checkpoint.phase,
            iteration: checkpoint.iteration,
            sequence_number: list.len() as u64,
            position: checkpoint.position,
            snapshot: checkpoint.snapshot.clone(),
            rollback_eligible: checkpoint.rollback_eligible,
            created_at: Utc::now(),
        };
        list.push(stored.clone());
        Ok(stored)
    }

    fn checkpoints(&self, wave_id: &str) -> Result<Vec<Checkpoint>, StoreError> {
        Ok(self
            .lock()?
            .checkpoints
            .get(wave_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wave_common::{
        ComplexitySignal, Phase, SnapshotState, Strategy, WaveContext, WaveStatus,
    };

    fn record(id: &str) -> WaveRecord {
        WaveRecord::start(&WaveContext::new(
            Some(id.to_string()),
            Strategy::Progressive,
            ComplexitySignal::default(),
        ))
    }

    fn new_checkpoint(record: &WaveRecord, position: u64) -> NewCheckpoint {
        NewCheckpoint {
            wave_id: record.wave_id.clone(),
            phase: Phase::Review,
            iteration: 1,
            position,
            snapshot: SnapshotState {
                record: record.clone(),
                phase_results: BTreeMap::new(),
            },
            rollback_eligible: true,
        }
    }

    #[test]
    fn test_duplicate_wave_rejected() {
        let store = MemoryStore::new();
        store.insert_wave(&record("w1")).unwrap();
        let err = store.insert_wave(&record("w1")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateWave { .. }));
    }

    #[test]
    fn test_update_missing_wave_fails() {
        let store = MemoryStore::new();
        let err = store.update_wave(&record("ghost")).unwrap_err();
        assert!(matches!(err, StoreError::WaveNotFound { .. }));
    }

    #[test]
    fn test_update_and_list_preserve_order() {
        let store = MemoryStore::new();
        store.insert_wave(&record("b")).unwrap();
        store.insert_wave(&record("a")).unwrap();
        let mut updated = record("b");
        updated.status = WaveStatus::Completed;
        store.update_wave(&updated).unwrap();

        let waves = store.list_waves().unwrap();
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0].wave_id, "b");
        assert_eq!(waves[0].status, WaveStatus::Completed);
    }

    #[test]
    fn test_checkpoint_sequences_are_per_wave() {
        let store = MemoryStore::new();
        let a = record("a");
        let b = record("b");
        store.insert_wave(&a).unwrap();
        store.insert_wave(&b).unwrap();

        assert_eq!(store.append_checkpoint(&new_checkpoint(&a, 0)).unwrap().sequence_number, 0);
        assert_eq!(store.append_checkpoint(&new_checkpoint(&a, 1)).unwrap().sequence_number, 1);
        assert_eq!(store.append_checkpoint(&new_checkpoint(&b, 0)).unwrap().sequence_number, 0);
        assert_eq!(store.checkpoints("a").unwrap().len(), 2);
    }

    #[test]
    fn test_checkpoint_requires_wave() {
        let store = MemoryStore::new();
        let err = store
            .append_checkpoint(&new_checkpoint(&record("none"), 0))
            .unwrap_err();
        assert!(matches!(err, StoreError::WaveNotFound { .. }));
    }
}
