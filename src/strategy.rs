//! Strategy selection.
//!
//! `select_strategy` is a pure function of the complexity signal. Its checks
//! run in a fixed order and the first match wins:
//!
//! | Order | Condition                                        | Strategy    |
//! |-------|--------------------------------------------------|-------------|
//! | 1     | `file_count > 100` and `score > 0.7`             | Enterprise  |
//! | 2     | more than 2 domains and more than 3 operations   | Adaptive    |
//! | 3     | `score > 0.8` and a `security` operation         | Systematic  |
//! | 4     | otherwise                                        | Progressive |

use serde::{Deserialize, Serialize};
use wave_common::{CheckpointGranularity, ComplexitySignal, Phase, Strategy, WaveContext};

use crate::config::OrchestratorSettings;

const ENTERPRISE_MIN_FILES: usize = 100;
const ENTERPRISE_MIN_SCORE: f64 = 0.7;
const ADAPTIVE_MIN_DOMAINS: usize = 2;
const ADAPTIVE_MIN_OPERATIONS: usize = 3;
const SYSTEMATIC_MIN_SCORE: f64 = 0.8;
const SECURITY_OPERATION: &str = "security";

/// Phases of the progressive strategy.
pub const PROGRESSIVE_PHASES: [Phase; 3] =
    [Phase::Review, Phase::Implementation, Phase::Validation];

/// Phases an adaptive wave falls back to once residual complexity is low.
pub const ADAPTIVE_CONVERGED_PHASES: [Phase; 2] = [Phase::Review, Phase::Validation];

/// How many iterations a strategy runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IterationPolicy {
    /// Exactly this many iterations.
    Fixed { count: u32 },
    /// Decided at runtime from residual complexity, never more than `max`.
    Dynamic { max: u32 },
}

impl IterationPolicy {
    /// Upper bound on iterations.
    pub fn max_iterations(&self) -> u32 {
        match self {
            Self::Fixed { count } => *count,
            Self::Dynamic { max } => *max,
        }
    }
}

/// Execution parameters of a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPlan {
    pub strategy: Strategy,
    /// Phases per iteration; for adaptive waves, the starting list.
    pub phases: Vec<Phase>,
    pub iterations: IterationPolicy,
    pub checkpoint_granularity: CheckpointGranularity,
    /// Run secondaries of sequential phases concurrently after the primary.
    pub parallel_fanout: bool,
    pub rollback_enabled: bool,
}

impl StrategyPlan {
    pub fn for_strategy(strategy: Strategy, settings: &OrchestratorSettings) -> Self {
        let (phases, iterations, checkpoint_granularity, parallel_fanout) = match strategy {
            Strategy::Enterprise => (
                Phase::ALL.to_vec(),
                IterationPolicy::Fixed { count: 1 },
                CheckpointGranularity::Continuous,
                true,
            ),
            Strategy::Adaptive => (
                Phase::ALL.to_vec(),
                IterationPolicy::Dynamic {
                    max: settings.adaptive_max_iterations.max(1),
                },
                CheckpointGranularity::AdaptiveStep,
                false,
            ),
            Strategy::Systematic => (
                Phase::ALL.to_vec(),
                IterationPolicy::Fixed { count: 1 },
                CheckpointGranularity::PerPhase,
                false,
            ),
            Strategy::Progressive => (
                PROGRESSIVE_PHASES.to_vec(),
                IterationPolicy::Fixed {
                    count: settings.progressive_iterations.max(1),
                },
                CheckpointGranularity::PerIteration,
                false,
            ),
        };

        Self {
            strategy,
            phases,
            iterations,
            checkpoint_granularity,
            parallel_fanout,
            rollback_enabled: settings.rollback_enabled,
        }
    }
}

/// Pick the strategy for a complexity signal.
pub fn select_strategy(signal: &ComplexitySignal) -> Strategy {
    if signal.file_count > ENTERPRISE_MIN_FILES && signal.complexity_score > ENTERPRISE_MIN_SCORE {
        return Strategy::Enterprise;
    }
    if signal.domains.len() > ADAPTIVE_MIN_DOMAINS
        && signal.operation_types.len() > ADAPTIVE_MIN_OPERATIONS
    {
        return Strategy::Adaptive;
    }
    if signal.complexity_score > SYSTEMATIC_MIN_SCORE
        && signal.operation_types.contains(SECURITY_OPERATION)
    {
        return Strategy::Systematic;
    }
    Strategy::Progressive
}

/// Select a strategy and resolve its plan in one step.
pub fn plan(signal: &ComplexitySignal, settings: &OrchestratorSettings) -> StrategyPlan {
    StrategyPlan::for_strategy(select_strategy(signal), settings)
}

/// Build a wave context for a signal, selecting the strategy unless one is forced.
pub fn context_for(
    signal: ComplexitySignal,
    wave_id: Option<String>,
    forced: Option<Strategy>,
) -> WaveContext {
    let strategy = forced.unwrap_or_else(|| select_strategy(&signal));
    WaveContext::new(wave_id, strategy, signal)
}

/// Phase list for the next adaptive iteration.
///
/// Once the residual score has dropped below `low_water` the wave stays on
/// review + validation for every remaining iteration; `converged` carries
/// that state between calls.
pub fn adaptive_phases(residual_score: f64, low_water: f64, converged: &mut bool) -> Vec<Phase> {
    if residual_score < low_water {
        *converged = true;
    }
    if *converged {
        ADAPTIVE_CONVERGED_PHASES.to_vec()
    } else {
        Phase::ALL.to_vec()
    }
}
