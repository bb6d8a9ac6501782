//! Wave orchestrator.
//!
//! Drives a wave through `created → running → {completed, partial, failed,
//! cancelled}`:
//!
//! - phases run in strategy order, iterations self-loop in `running`
//! - a failed phase is retried with an identical payload up to
//!   `max_phase_retries` times
//! - a permanently failed phase ends the wave `partial` when an eligible
//!   checkpoint exists (its `phases_completed` is restored) and `failed`
//!   otherwise
//! - a rejected checkpoint or record write ends the wave `failed`, including
//!   the initial insert of the wave record
//!
//! Callers get a `WaveOutcome`; the only errors are rejected contexts.

mod engine;
mod registry;

pub use registry::{RunGuard, RunningWaves};

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use wave_common::{
    Checkpoint, PhaseExecution, Strategy, WaveContext, WaveFault, WaveOutcome, WaveRecord,
    WaveStatus,
};

use crate::analyzer::ComplexityWeights;
use crate::checkpoint::CheckpointStore;
use crate::config::OrchestratorSettings;
use crate::errors::{StoreError, WaveError};
use crate::metrics::{MetricsRecorder, MetricsSnapshot};
use crate::router::PhaseRouter;
use crate::scope::Scope;
use crate::store::WaveStore;
use crate::strategy::StrategyPlan;

use engine::WaveRun;

pub struct WaveOrchestrator {
    store: Arc<dyn WaveStore>,
    checkpoints: CheckpointStore,
    router: PhaseRouter,
    settings: OrchestratorSettings,
    weights: ComplexityWeights,
    metrics: Arc<MetricsRecorder>,
    running: RunningWaves,
}

impl WaveOrchestrator {
    pub fn new(store: Arc<dyn WaveStore>, router: PhaseRouter, settings: OrchestratorSettings) -> Self {
        Self {
            checkpoints: CheckpointStore::new(Arc::clone(&store)),
            store,
            router,
            settings,
            weights: ComplexityWeights::default(),
            metrics: Arc::new(MetricsRecorder::new()),
            running: RunningWaves::new(),
        }
    }

    /// Weights used for adaptive residual analysis.
    pub fn with_weights(mut self, weights: ComplexityWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn plan_for(&self, strategy: Strategy) -> StrategyPlan {
        StrategyPlan::for_strategy(strategy, &self.settings)
    }

    /// Execute a wave without a scope.
    pub async fn execute_wave(&self, context: WaveContext) -> Result<WaveOutcome, WaveError> {
        self.execute_wave_cancellable(context, None, CancellationToken::new())
            .await
    }

    /// Execute a wave over `scope`, which feeds task payloads and adaptive
    /// residual analysis.
    pub async fn execute_wave_with_scope(
        &self,
        context: WaveContext,
        scope: Scope,
    ) -> Result<WaveOutcome, WaveError> {
        self.execute_wave_cancellable(context, Some(scope), CancellationToken::new())
            .await
    }

    /// Execute a wave that stops cooperatively once `cancel` fires.
    pub async fn execute_wave_cancellable(
        &self,
        context: WaveContext,
        scope: Option<Scope>,
        cancel: CancellationToken,
    ) -> Result<WaveOutcome, WaveError> {
        context
            .validate()
            .map_err(|e| WaveError::invalid_context(&context.wave_id, e.to_string()))?;

        let _guard = self
            .running
            .claim(&context.wave_id)
            .ok_or_else(|| WaveError::invalid_context(&context.wave_id, "wave is already running"))?;

        let mut record = WaveRecord::start(&context);
        match self.store.insert_wave(&record) {
            Ok(()) => {}
            Err(StoreError::DuplicateWave { wave_id }) => {
                return Err(WaveError::invalid_context(&wave_id, "wave_id already exists"));
            }
            Err(e) => {
                tracing::error!(wave_id = %context.wave_id, error = %e, "failed to create wave record");
                record.status = WaveStatus::Failed;
                record.end_time = Some(Utc::now());
                record.faults.push(WaveFault::Persistence {
                    message: e.to_string(),
                });
                self.metrics.record_wave(record.status);
                return Ok(WaveOutcome::from_record(&record, None));
            }
        }

        let span = tracing::info_span!(
            "wave",
            wave_id = %context.wave_id,
            strategy = %context.strategy
        );
        let outcome = WaveRun::new(self, &context, record, scope, cancel)
            .run()
            .instrument(span)
            .await;
        self.metrics.record_wave(outcome.status);
        Ok(outcome)
    }

    /// Rebuild the outcome of a wave from the store.
    pub fn wave_outcome(&self, wave_id: &str) -> Result<WaveOutcome, WaveError> {
        let record = self
            .store
            .get_wave(wave_id)?
            .ok_or_else(|| WaveError::WaveNotFound {
                wave_id: wave_id.to_string(),
            })?;
        Ok(WaveOutcome::from_record(
            &record,
            self.final_checkpoint(wave_id)?,
        ))
    }

    /// Sequence number of the latest eligible checkpoint.
    pub fn final_checkpoint(&self, wave_id: &str) -> Result<Option<u64>, StoreError> {
        Ok(self
            .checkpoints
            .latest_eligible(wave_id)?
            .map(|c| c.sequence_number))
    }

    pub fn checkpoints(&self, wave_id: &str) -> Result<Vec<Checkpoint>, WaveError> {
        Ok(self.checkpoints.list(wave_id)?)
    }

    pub fn phase_executions(&self, wave_id: &str) -> Result<Vec<PhaseExecution>, WaveError> {
        Ok(self.store.phase_executions(wave_id)?)
    }

    pub fn is_running(&self, wave_id: &str) -> bool {
        self.running.is_running(wave_id)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
