use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use wave_common::{
    AgentFault, AgentKind, Checkpoint, ExecutionMode, NewCheckpoint, Phase, PhaseExecution,
    PhaseStatus, SnapshotState, Strategy, WaveFault, WaveRecord, WaveStatus,
};

use super::WaveStore;
use crate::errors::StoreError;

/// SQLite-backed store.
///
/// One connection guarded by a mutex; every method holds the lock for the
/// duration of a single statement or transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing and dry runs).
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn init(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS waves (
                wave_id TEXT PRIMARY KEY,
                strategy TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'in_progress',
                phases_completed TEXT NOT NULL DEFAULT '[]',
                iterations_run INTEGER NOT NULL DEFAULT 0,
                faults TEXT NOT NULL DEFAULT '[]',
                start_time TEXT NOT NULL,
                end_time TEXT,
                created_seq INTEGER
            );

            CREATE TABLE IF NOT EXISTS phase_executions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                wave_id TEXT NOT NULL REFERENCES waves(wave_id) ON DELETE CASCADE,
                phase TEXT NOT NULL,
                iteration INTEGER NOT NULL,
                attempt INTEGER NOT NULL,
                agents_invoked TEXT NOT NULL DEFAULT '[]',
                execution_mode TEXT NOT NULL,
                status TEXT NOT NULL,
                duration_ms INTEGER NOT NULL DEFAULT 0,
                result_summary TEXT NOT NULL DEFAULT 'null',
                faults TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS checkpoints (
                wave_id TEXT NOT NULL REFERENCES waves(wave_id) ON DELETE CASCADE,
                sequence_number INTEGER NOT NULL,
                phase TEXT NOT NULL,
                iteration INTEGER NOT NULL,
                position INTEGER NOT NULL,
                snapshot TEXT NOT NULL,
                rollback_eligible INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                PRIMARY KEY (wave_id, sequence_number)
            );

            CREATE INDEX IF NOT EXISTS idx_phase_executions_wave ON phase_executions(wave_id);
            ",
        )?;

        // Additive migrations; only "duplicate column" is ignored on re-run.
        for column in [
            "complexity_score REAL NOT NULL DEFAULT 0",
            "file_count INTEGER NOT NULL DEFAULT 0",
        ] {
            match conn.execute(&format!("ALTER TABLE waves ADD COLUMN {}", column), []) {
                Ok(_) => {}
                Err(e) if e.to_string().contains("duplicate column") => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn parse_enum<T: FromStr<Err = String>>(table: &'static str, raw: &str) -> Result<T, StoreError> {
    T::from_str(raw).map_err(|message| StoreError::Corrupt { table, message })
}

fn parse_time(table: &'static str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            table,
            message: format!("bad timestamp '{}': {}", raw, e),
        })
}

impl WaveStore for SqliteStore {
    fn insert_wave(&self, record: &WaveRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO waves
                (wave_id, strategy, status, phases_completed, iterations_run, faults,
                 complexity_score, file_count, start_time, end_time, created_seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                 (SELECT COALESCE(MAX(created_seq) + 1, 0) FROM waves))",
            params![
                record.wave_id,
                record.strategy.as_str(),
                record.status.as_str(),
                serde_json::to_string(&record.phases_completed)?,
                record.iterations_run,
                serde_json::to_string(&record.faults)?,
                record.complexity_score,
                record.file_count as i64,
                record.start_time.to_rfc3339(),
                record.end_time.map(|t| t.to_rfc3339()),
            ],
        )?;
        if inserted == 0 {
            return Err(StoreError::DuplicateWave {
                wave_id: record.wave_id.clone(),
            });
        }
        Ok(())
    }

    fn update_wave(&self, record: &WaveRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE waves SET strategy = ?1, status = ?2, phases_completed = ?3, iterations_run = ?4,
                faults = ?5, complexity_score = ?6, file_count = ?7, start_time = ?8, end_time = ?9
             WHERE wave_id = ?10",
            params![
                record.strategy.as_str(),
                record.status.as_str(),
                serde_json::to_string(&record.phases_completed)?,
                record.iterations_run,
                serde_json::to_string(&record.faults)?,
                record.complexity_score,
                record.file_count as i64,
                record.start_time.to_rfc3339(),
                record.end_time.map(|t| t.to_rfc3339()),
                record.wave_id,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::WaveNotFound {
                wave_id: record.wave_id.clone(),
            });
        }
        Ok(())
    }

    fn get_wave(&self, wave_id: &str) -> Result<Option<WaveRecord>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT wave_id, strategy, status, phases_completed, iterations_run, faults, start_time, end_time,
                        complexity_score, file_count
                 FROM waves WHERE wave_id = ?1",
                params![wave_id],
                WaveRow::from_row,
            )
            .optional()?;
        row.map(WaveRow::into_record).transpose()
    }

    fn list_waves(&self) -> Result<Vec<WaveRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT wave_id, strategy, status, phases_completed, iterations_run, faults, start_time, end_time,
                        complexity_score, file_count
             FROM waves ORDER BY created_seq ASC",
        )?;
        let rows = stmt.query_map([], WaveRow::from_row)?;
        let mut waves = Vec::new();
        for row in rows {
            waves.push(row?.into_record()?);
        }
        Ok(waves)
    }

    fn insert_phase_execution(&self, execution: &PhaseExecution) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO phase_executions
                (wave_id, phase, iteration, attempt, agents_invoked, execution_mode, status, duration_ms, result_summary, faults)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                execution.wave_id,
                execution.phase.as_str(),
                execution.iteration,
                execution.attempt,
                serde_json::to_string(&execution.agents_invoked)?,
                execution.execution_mode.as_str(),
                execution.status.as_str(),
                execution.duration.as_millis() as i64,
                serde_json::to_string(&execution.result_summary)?,
                serde_json::to_string(&execution.faults)?,
            ],
        )
        .map_err(|e| missing_wave_or(e, &execution.wave_id))?;
        Ok(())
    }

    fn phase_executions(&self, wave_id: &str) -> Result<Vec<PhaseExecution>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT wave_id, phase, iteration, attempt, agents_invoked, execution_mode, status, duration_ms, result_summary, faults
             FROM phase_executions WHERE wave_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![wave_id], |row| {
            Ok(PhaseExecutionRow {
                wave_id: row.get(0)?,
                phase: row.get(1)?,
                iteration: row.get(2)?,
                attempt: row.get(3)?,
                agents_invoked: row.get(4)?,
                execution_mode: row.get(5)?,
                status: row.get(6)?,
                duration_ms: row.get(7)?,
                result_summary: row.get(8)?,
                faults: row.get(9)?,
            })
        })?;
        let mut executions = Vec::new();
        for row in rows {
            executions.push(row?.into_execution()?);
        }
        Ok(executions)
    }

    fn append_checkpoint(&self, checkpoint: &NewCheckpoint) -> Result<Checkpoint, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let sequence_number: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sequence_number) + 1, 0) FROM checkpoints WHERE wave_id = ?1",
            params![checkpoint.wave_id],
            |row| row.get(0),
        )?;
        let created_at = Utc::now();
        tx.execute(
            "INSERT INTO checkpoints
                (wave_id, sequence_number, phase, iteration, position, snapshot, rollback_eligible, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                checkpoint.wave_id,
                sequence_number,
                checkpoint.phase.as_str(),
                checkpoint.iteration,
                checkpoint.position as i64,
                serde_json::to_string(&checkpoint.snapshot)?,
                checkpoint.rollback_eligible,
                created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| missing_wave_or(e, &checkpoint.wave_id))?;
        tx.commit()?;

        Ok(Checkpoint {
            wave_id: checkpoint.wave_id.clone(),
            phase: checkpoint.phase,
            iteration: checkpoint.iteration,
            sequence_number: sequence_number as u64,
            position: checkpoint.position,
            snapshot: checkpoint.snapshot.clone(),
            rollback_eligible: checkpoint.rollback_eligible,
            created_at,
        })
    }

    fn checkpoints(&self, wave_id: &str) -> Result<Vec<Checkpoint>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT wave_id, sequence_number, phase, iteration, position, snapshot, rollback_eligible, created_at
             FROM checkpoints WHERE wave_id = ?1 ORDER BY sequence_number ASC",
        )?;
        let rows = stmt.query_map(params![wave_id], |row| {
            Ok(CheckpointRow {
                wave_id: row.get(0)?,
                sequence_number: row.get(1)?,
                phase: row.get(2)?,
                iteration: row.get(3)?,
                position: row.get(4)?,
                snapshot: row.get(5)?,
                rollback_eligible: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?;
        let mut checkpoints = Vec::new();
        for row in rows {
            checkpoints.push(row?.into_checkpoint()?);
        }
        Ok(checkpoints)
    }
}

/// Foreign key violations mean the wave row does not exist.
fn missing_wave_or(err: rusqlite::Error, wave_id: &str) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::WaveNotFound {
                wave_id: wave_id.to_string(),
            }
        }
        other => StoreError::Database(other),
    }
}

/// Intermediate row struct for waves.
struct WaveRow {
    wave_id: String,
    strategy: String,
    status: String,
    phases_completed: String,
    iterations_run: u32,
    faults: String,
    start_time: String,
    end_time: Option<String>,
    complexity_score: f64,
    file_count: i64,
}

impl WaveRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            wave_id: row.get(0)?,
            strategy: row.get(1)?,
            status: row.get(2)?,
            phases_completed: row.get(3)?,
            iterations_run: row.get(4)?,
            faults: row.get(5)?,
            start_time: row.get(6)?,
            end_time: row.get(7)?,
            complexity_score: row.get(8)?,
            file_count: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<WaveRecord, StoreError> {
        let strategy: Strategy = parse_enum("waves", &self.strategy)?;
        let status: WaveStatus = parse_enum("waves", &self.status)?;
        let phases_completed: Vec<String> = serde_json::from_str(&self.phases_completed)?;
        let faults: Vec<WaveFault> = serde_json::from_str(&self.faults)?;
        let end_time = match self.end_time {
            Some(raw) => Some(parse_time("waves", &raw)?),
            None => None,
        };

        Ok(WaveRecord {
            wave_id: self.wave_id,
            strategy,
            status,
            phases_completed,
            iterations_run: self.iterations_run,
            faults,
            complexity_score: self.complexity_score,
            file_count: usize::try_from(self.file_count).map_err(|_| StoreError::Corrupt {
                table: "waves",
                message: format!("negative file_count {}", self.file_count),
            })?,
            start_time: parse_time("waves", &self.start_time)?,
            end_time,
        })
    }
}

/// Intermediate row struct for phase_executions.
struct PhaseExecutionRow {
    wave_id: String,
    phase: String,
    iteration: u32,
    attempt: u32,
    agents_invoked: String,
    execution_mode: String,
    status: String,
    duration_ms: i64,
    result_summary: String,
    faults: String,
}

impl PhaseExecutionRow {
    fn into_execution(self) -> Result<PhaseExecution, StoreError> {
        let phase: Phase = parse_enum("phase_executions", &self.phase)?;
        let execution_mode: ExecutionMode = parse_enum("phase_executions", &self.execution_mode)?;
        let status: PhaseStatus = parse_enum("phase_executions", &self.status)?;
        let agents_invoked: Vec<AgentKind> = serde_json::from_str(&self.agents_invoked)?;
        let faults: Vec<AgentFault> = serde_json::from_str(&self.faults)?;

        Ok(PhaseExecution {
            wave_id: self.wave_id,
            phase,
            iteration: self.iteration,
            attempt: self.attempt,
            agents_invoked,
            execution_mode,
            status,
            duration: Duration::from_millis(self.duration_ms.max(0) as u64),
            result_summary: serde_json::from_str(&self.result_summary)?,
            faults,
        })
    }
}

/// Intermediate row struct for checkpoints.
struct CheckpointRow {
    wave_id: String,
    sequence_number: i64,
    phase: String,
    iteration: u32,
    position: i64,
    snapshot: String,
    rollback_eligible: bool,
    created_at: String,
}

impl CheckpointRow {
    fn into_checkpoint(self) -> Result<Checkpoint, StoreError> {
        let phase: Phase = parse_enum("checkpoints", &self.phase)?;
        let snapshot: SnapshotState = serde_json::from_str(&self.snapshot)?;

        Ok(Checkpoint {
            wave_id: self.wave_id,
            phase,
            iteration: self.iteration,
            sequence_number: self.sequence_number as u64,
            position: self.position as u64,
            snapshot,
            rollback_eligible: self.rollback_eligible,
            created_at: parse_time("checkpoints", &self.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tempfile::tempdir;
    use wave_common::{ComplexitySignal, FaultKind, WaveContext};

    fn record(id: &str) -> WaveRecord {
        WaveRecord::start(&WaveContext::new(
            Some(id.to_string()),
            Strategy::Systematic,
            ComplexitySignal::default(),
        ))
    }

    fn checkpoint_for(record: &WaveRecord, phase: Phase, position: u64) -> NewCheckpoint {
        NewCheckpoint {
            wave_id: record.wave_id.clone(),
            phase,
            iteration: 1,
            position,
            snapshot: SnapshotState {
                record: record.clone(),
                phase_results: BTreeMap::from([(phase.step_id(1), json!({"ok": true}))]),
            },
            rollback_eligible: true,
        }
    }

    #[test]
    fn test_migrations_create_tables() {
        let store = SqliteStore::new_in_memory().unwrap();
        let conn = store.lock().unwrap();
        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('waves', 'phase_executions', 'checkpoints')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_wave_roundtrip_with_faults() {
        let store = SqliteStore::new_in_memory().unwrap();
        let mut rec = record("w1");
        store.insert_wave(&rec).unwrap();

        rec.status = WaveStatus::Partial;
        rec.phases_completed = vec!["review.1".into(), "planning.1".into()];
        rec.iterations_run = 1;
        rec.faults.push(WaveFault::Agent(
            AgentFault::new(AgentKind::Quality, FaultKind::Timeout, "slow").in_phase(Phase::Review),
        ));
        rec.faults.push(WaveFault::PhaseFailure {
            phase: Phase::Implementation,
            iteration: 1,
            attempts: 3,
        });
        rec.end_time = Some(Utc::now());
        store.update_wave(&rec).unwrap();

        let loaded = store.get_wave("w1").unwrap().unwrap();
        assert_eq!(loaded.status, WaveStatus::Partial);
        assert_eq!(loaded.phases_completed, rec.phases_completed);
        assert_eq!(loaded.faults, rec.faults);
        assert!(loaded.end_time.is_some());
        assert!(store.get_wave("missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_wave_rejected() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.insert_wave(&record("dup")).unwrap();
        let err = store.insert_wave(&record("dup")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateWave { .. }));
    }

    #[test]
    fn test_update_missing_wave() {
        let store = SqliteStore::new_in_memory().unwrap();
        let err = store.update_wave(&record("nope")).unwrap_err();
        assert!(matches!(err, StoreError::WaveNotFound { .. }));
    }

    #[test]
    fn test_phase_executions_keep_insertion_order() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.insert_wave(&record("w")).unwrap();
        for attempt in 1..=3 {
            store
                .insert_phase_execution(&PhaseExecution {
                    wave_id: "w".into(),
                    phase: Phase::Review,
                    iteration: 1,
                    attempt,
                    agents_invoked: vec![AgentKind::Quality, AgentKind::Security],
                    execution_mode: ExecutionMode::Parallel,
                    status: if attempt == 3 {
                        PhaseStatus::Succeeded
                    } else {
                        PhaseStatus::Failed
                    },
                    duration: Duration::from_millis(12),
                    result_summary: json!({"primary": null}),
                    faults: Vec::new(),
                })
                .unwrap();
        }
        let executions = store.phase_executions("w").unwrap();
        assert_eq!(executions.len(), 3);
        assert_eq!(executions[2].attempt, 3);
        assert_eq!(executions[2].status, PhaseStatus::Succeeded);
        assert_eq!(executions[0].duration, Duration::from_millis(12));
    }

    #[test]
    fn test_phase_execution_for_unknown_wave() {
        let store = SqliteStore::new_in_memory().unwrap();
        let err = store
            .insert_phase_execution(&PhaseExecution {
                wave_id: "ghost".into(),
                phase: Phase::Review,
                iteration: 1,
                attempt: 1,
                agents_invoked: Vec::new(),
                execution_mode: ExecutionMode::Parallel,
                status: PhaseStatus::Failed,
                duration: Duration::ZERO,
                result_summary: json!(null),
                faults: Vec::new(),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::WaveNotFound { .. }));
    }

    #[test]
    fn test_list_waves_keeps_signal_and_insert_order() {
        let store = SqliteStore::new_in_memory().unwrap();
        let busy = WaveRecord::start(&WaveContext::new(
            Some("busy".to_string()),
            Strategy::Enterprise,
            ComplexitySignal {
                complexity_score: 0.82,
                file_count: 140,
                ..ComplexitySignal::default()
            },
        ));
        store.insert_wave(&record("zeta")).unwrap();
        store.insert_wave(&busy).unwrap();

        let waves = store.list_waves().unwrap();
        let ids: Vec<&str> = waves.iter().map(|w| w.wave_id.as_str()).collect();
        assert_eq!(ids, vec!["zeta", "busy"]);
        assert_eq!(waves[1].complexity_score, 0.82);
        assert_eq!(waves[1].file_count, 140);
        assert_eq!(waves[1], busy);
    }

    #[test]
    fn test_checkpoint_sequence_is_gap_free() {
        let store = SqliteStore::new_in_memory().unwrap();
        let rec = record("w");
        store.insert_wave(&rec).unwrap();
        for (i, phase) in Phase::ALL.iter().enumerate() {
            let cp = store
                .append_checkpoint(&checkpoint_for(&rec, *phase, i as u64))
                .unwrap();
            assert_eq!(cp.sequence_number, i as u64);
        }
        let listed = store.checkpoints("w").unwrap();
        let seqs: Vec<u64> = listed.iter().map(|c| c.sequence_number).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
        assert_eq!(listed[4].phase, Phase::Optimization);
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("waves.db");
        {
            let store = SqliteStore::new(&path).unwrap();
            let rec = record("persist");
            store.insert_wave(&rec).unwrap();
            store
                .append_checkpoint(&checkpoint_for(&rec, Phase::Review, 0))
                .unwrap();
        }
        let store = SqliteStore::new(&path).unwrap();
        assert!(store.get_wave("persist").unwrap().is_some());
        let checkpoints = store.checkpoints("persist").unwrap();
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(
            checkpoints[0].snapshot.phase_results["review.1"],
            json!({"ok": true})
        );
        assert_eq!(store.list_waves().unwrap().len(), 1);
    }
}
