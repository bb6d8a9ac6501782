//! Execution loop of a single wave.
//!
//! A `WaveRun` owns the in-memory `WaveRecord` for the duration of the
//! wave and is the only writer of its rows. Phases run strictly in order;
//! the only suspension point is the router dispatch, which is raced against
//! the cancellation token.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use wave_common::{
    Phase, PhaseExecution, PhaseStatus, SnapshotState, WaveContext, WaveFault, WaveOutcome,
    WaveRecord, WaveStatus,
};

use super::WaveOrchestrator;
use crate::analyzer;
use crate::router::{PhaseResult, route};
use crate::scope::Scope;
use crate::strategy::{IterationPolicy, StrategyPlan, adaptive_phases};

/// Key of the optional array of unit paths a primary agent reports as done.
const PROCESSED_KEY: &str = "processed";

/// How one phase step ended.
enum StepOutcome {
    Succeeded(PhaseResult),
    Failed,
    Cancelled,
    /// A write the wave cannot continue without was rejected.
    Aborted(WaveFault),
}

pub(super) struct WaveRun<'a> {
    orchestrator: &'a WaveOrchestrator,
    context: &'a WaveContext,
    plan: StrategyPlan,
    scope: Option<Scope>,
    cancel: CancellationToken,
    record: WaveRecord,
    phase_results: BTreeMap<String, Value>,
    previous: Value,
    /// Index of the next phase step within the wave.
    position: u64,
}

impl<'a> WaveRun<'a> {
    pub(super) fn new(
        orchestrator: &'a WaveOrchestrator,
        context: &'a WaveContext,
        record: WaveRecord,
        scope: Option<Scope>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            orchestrator,
            context,
            plan: orchestrator.plan_for(context.strategy),
            scope,
            cancel,
            record,
            phase_results: BTreeMap::new(),
            previous: Value::Null,
            position: 0,
        }
    }

    pub(super) async fn run(mut self) -> WaveOutcome {
        tracing::info!(
            phases = ?self.plan.phases,
            iterations = self.plan.iterations.max_iterations(),
            granularity = %self.plan.checkpoint_granularity,
            "wave started"
        );

        let max_iterations = self.plan.iterations.max_iterations();
        let adaptive = matches!(self.plan.iterations, IterationPolicy::Dynamic { .. });
        let mut residual = self.scope.clone();
        let mut converged = false;

        for iteration in 1..=max_iterations {
            let iteration_scope = if adaptive {
                residual.clone()
            } else {
                self.scope.clone()
            };

            let phases = if adaptive {
                if iteration > 1 && residual.as_ref().is_none_or(Scope::is_empty) {
                    tracing::info!(iteration, "residual scope exhausted");
                    break;
                }
                let residual_score = match &residual {
                    Some(scope) if iteration > 1 => {
                        analyzer::analyze_residual(scope, &self.orchestrator.weights)
                            .complexity_score
                    }
                    _ => self.context.complexity_score,
                };
                let phases = adaptive_phases(
                    residual_score,
                    self.orchestrator.settings.adaptive_low_water,
                    &mut converged,
                );
                tracing::debug!(iteration, residual_score, ?phases, "adaptive phase list");
                phases
            } else {
                self.plan.phases.clone()
            };

            self.record.iterations_run = iteration;
            let mut reported: Option<HashSet<String>> = None;

            for (index, phase) in phases.iter().copied().enumerate() {
                if self.cancel.is_cancelled() {
                    return self.finish_cancelled(None);
                }
                let last_in_iteration = index + 1 == phases.len();
                let payload = self.payload(phase, iteration, iteration_scope.as_ref());

                let span = tracing::info_span!("phase", phase = %phase, iteration);
                let step = self.run_phase(phase, iteration, &payload).instrument(span).await;
                let result = match step {
                    StepOutcome::Succeeded(result) => result,
                    StepOutcome::Failed => return self.finish_failed(phase),
                    StepOutcome::Cancelled => return self.finish_cancelled(Some(phase)),
                    StepOutcome::Aborted(fault) => return self.finish_aborted(fault),
                };

                if let Some(paths) = processed_paths(result.primary_payload()) {
                    reported.get_or_insert_with(HashSet::new).extend(paths);
                }
                if let Err(fault) = self.complete_step(phase, iteration, result, last_in_iteration) {
                    return self.finish_aborted(fault);
                }
            }

            if adaptive {
                residual = Some(match residual.take() {
                    Some(scope) => {
                        let processed = reported.unwrap_or_else(|| scope.paths().into_iter().collect());
                        scope.remaining(&processed)
                    }
                    None => Scope::default(),
                });
            }
        }

        self.finish(WaveStatus::Completed)
    }

    /// Task payload for one dispatch. Retries reuse it unchanged.
    fn payload(&self, phase: Phase, iteration: u32, scope: Option<&Scope>) -> Value {
        json!({
            "wave_id": self.context.wave_id,
            "strategy": self.context.strategy.as_str(),
            "phase": phase.as_str(),
            "iteration": iteration,
            "scope": scope.map(Scope::paths).unwrap_or_default(),
            "operation_types": self.context.operation_types,
            "domains": self.context.domains,
            "complexity_score": self.context.complexity_score,
            "previous": self.previous,
        })
    }

    async fn run_phase(&mut self, phase: Phase, iteration: u32, payload: &Value) -> StepOutcome {
        let max_attempts = self.orchestrator.settings.max_attempts();
        let router = &self.orchestrator.router;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tracing::warn!(attempt, max_attempts, "retrying phase");
            }

            let dispatch = router.dispatch_with(phase, payload, self.plan.parallel_fanout);
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::warn!(attempt, "phase cancelled in flight");
                    let skipped = self.execution(phase, iteration, attempt, PhaseStatus::Skipped);
                    if let Err(e) = self.orchestrator.store.insert_phase_execution(&skipped) {
                        tracing::error!(error = %e, "failed to record skipped phase");
                    }
                    return StepOutcome::Cancelled;
                }
                result = dispatch => result,
            };

            let faults: Vec<_> = result
                .faults
                .iter()
                .cloned()
                .map(|f| f.on_attempt(attempt))
                .collect();
            self.record
                .faults
                .extend(faults.iter().cloned().map(WaveFault::Agent));

            let execution = PhaseExecution {
                agents_invoked: result.agents_invoked.clone(),
                execution_mode: result.mode,
                duration: result.duration,
                result_summary: result.summary.clone(),
                faults,
                ..self.execution(phase, iteration, attempt, result.status)
            };
            if let Err(e) = self.orchestrator.store.insert_phase_execution(&execution) {
                tracing::error!(error = %e, "failed to record phase execution");
                return StepOutcome::Aborted(WaveFault::Persistence {
                    message: e.to_string(),
                });
            }
            self.orchestrator
                .metrics
                .record_phase(phase, result.status, result.duration);

            if result.succeeded() {
                tracing::info!(attempt, duration_ms = result.duration.as_millis() as u64, "phase succeeded");
                return StepOutcome::Succeeded(result);
            }
            tracing::warn!(attempt, faults = result.faults.len(), "phase attempt failed");
        }

        self.record.faults.push(WaveFault::PhaseFailure {
            phase,
            iteration,
            attempts: max_attempts,
        });
        StepOutcome::Failed
    }

    fn execution(
        &self,
        phase: Phase,
        iteration: u32,
        attempt: u32,
        status: PhaseStatus,
    ) -> PhaseExecution {
        PhaseExecution {
            wave_id: self.record.wave_id.clone(),
            phase,
            iteration,
            attempt,
            agents_invoked: Vec::new(),
            execution_mode: route(phase).mode,
            status,
            duration: std::time::Duration::ZERO,
            result_summary: Value::Null,
            faults: Vec::new(),
        }
    }

    /// Record a succeeded step, checkpoint it if required and persist the record.
    fn complete_step(
        &mut self,
        phase: Phase,
        iteration: u32,
        result: PhaseResult,
        last_in_iteration: bool,
    ) -> Result<(), WaveFault> {
        let step_id = phase.step_id(iteration);
        self.record.phases_completed.push(step_id.clone());
        self.phase_results.insert(step_id, result.summary.clone());
        self.previous = result.summary;
        let position = self.position;
        self.position += 1;

        if self.plan.checkpoint_granularity.checkpoint_after(last_in_iteration) {
            let snapshot = SnapshotState {
                record: self.record.clone(),
                phase_results: self.phase_results.clone(),
            };
            self.orchestrator
                .checkpoints
                .create(
                    &self.record.wave_id,
                    phase,
                    iteration,
                    position,
                    snapshot,
                    self.plan.rollback_enabled,
                )
                .map_err(|e| {
                    tracing::error!(error = %e, "checkpoint write failed");
                    WaveFault::CheckpointWrite {
                        phase,
                        message: e.to_string(),
                    }
                })?;
        }

        self.orchestrator
            .store
            .update_wave(&self.record)
            .map_err(|e| {
                tracing::error!(error = %e, "wave record update failed");
                WaveFault::Persistence {
                    message: e.to_string(),
                }
            })
    }

    /// Restore `phases_completed` from the last eligible checkpoint at or
    /// before the current position. Returns whether one was found.
    fn restore(&mut self) -> bool {
        match self
            .orchestrator
            .checkpoints
            .rollback_to(&self.record.wave_id, self.position)
        {
            Ok(Some(snapshot)) => {
                self.record.phases_completed = snapshot.record.phases_completed;
                true
            }
            Ok(None) => {
                self.record.phases_completed.clear();
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to read checkpoints for rollback");
                self.record.faults.push(WaveFault::Persistence {
                    message: e.to_string(),
                });
                self.record.phases_completed.clear();
                false
            }
        }
    }

    fn finish_failed(mut self, phase: Phase) -> WaveOutcome {
        let status = if self.restore() {
            WaveStatus::Partial
        } else {
            WaveStatus::Failed
        };
        tracing::warn!(phase = %phase, status = %status, "phase permanently failed");
        self.finish(status)
    }

    fn finish_cancelled(mut self, phase: Option<Phase>) -> WaveOutcome {
        self.record.faults.push(WaveFault::Cancelled { phase });
        self.restore();
        self.finish(WaveStatus::Cancelled)
    }

    fn finish_aborted(mut self, fault: WaveFault) -> WaveOutcome {
        self.record.faults.push(fault);
        self.finish(WaveStatus::Failed)
    }

    fn finish(mut self, status: WaveStatus) -> WaveOutcome {
        self.record.status = status;
        self.record.end_time = Some(Utc::now());
        if let Err(e) = self.orchestrator.store.update_wave(&self.record) {
            tracing::error!(error = %e, "failed to persist terminal wave record");
        }

        let final_checkpoint = self
            .orchestrator
            .final_checkpoint(&self.record.wave_id)
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to read final checkpoint");
                None
            });

        tracing::info!(
            status = %status,
            phases_completed = self.record.phases_completed.len(),
            iterations = self.record.iterations_run,
            faults = self.record.faults.len(),
            "wave finished"
        );
        WaveOutcome::from_record(&self.record, final_checkpoint)
    }
}

/// Unit paths listed under `"processed"` in a primary payload.
fn processed_paths(payload: &Value) -> Option<Vec<String>> {
    let items = payload.get(PROCESSED_KEY)?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processed_paths() {
        assert_eq!(
            processed_paths(&json!({"processed": ["a.rs", 3, "b.rs"]})),
            Some(vec!["a.rs".to_string(), "b.rs".to_string()])
        );
        assert_eq!(processed_paths(&json!({"processed": []})), Some(Vec::new()));
        assert_eq!(processed_paths(&json!({"other": 1})), None);
        assert_eq!(processed_paths(&Value::Null), None);
    }
}
