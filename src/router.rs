//! Phase-agent router.
//!
//! Every phase has a fixed route: one primary agent, its secondaries and an
//! execution mode.
//!
//! | Phase          | Primary     | Secondaries           | Mode       |
//! |----------------|-------------|-----------------------|------------|
//! | Review         | Quality     | Security, Performance | parallel   |
//! | Planning       | Performance | Quality               | sequential |
//! | Implementation | Quality     | Security              | sequential |
//! | Validation     | Security    | Quality, Monitor      | parallel   |
//! | Optimization   | Performance | Monitor               | parallel   |
//!
//! In parallel mode every agent receives the same payload and the phase
//! succeeds iff the primary does; secondary faults are advisory. In
//! sequential mode the primary runs first, its output is merged into the
//! payload, and every secondary must then succeed.
//!
//! Faults never leave the router: they are returned inside `PhaseResult`.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use wave_common::{AgentFault, AgentKind, ExecutionMode, FaultKind, Phase, PhaseStatus};

use crate::agents::AgentPool;

/// Static dispatch route of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub primary: AgentKind,
    pub secondaries: &'static [AgentKind],
    pub mode: ExecutionMode,
}

impl Route {
    /// Primary followed by secondaries.
    pub fn agents(&self) -> Vec<AgentKind> {
        std::iter::once(self.primary)
            .chain(self.secondaries.iter().copied())
            .collect()
    }
}

/// Route for `phase`.
pub fn route(phase: Phase) -> Route {
    match phase {
        Phase::Review => Route {
            primary: AgentKind::Quality,
            secondaries: &[AgentKind::Security, AgentKind::Performance],
            mode: ExecutionMode::Parallel,
        },
        Phase::Planning => Route {
            primary: AgentKind::Performance,
            secondaries: &[AgentKind::Quality],
            mode: ExecutionMode::Sequential,
        },
        Phase::Implementation => Route {
            primary: AgentKind::Quality,
            secondaries: &[AgentKind::Security],
            mode: ExecutionMode::Sequential,
        },
        Phase::Validation => Route {
            primary: AgentKind::Security,
            secondaries: &[AgentKind::Quality, AgentKind::Monitor],
            mode: ExecutionMode::Parallel,
        },
        Phase::Optimization => Route {
            primary: AgentKind::Performance,
            secondaries: &[AgentKind::Monitor],
            mode: ExecutionMode::Parallel,
        },
    }
}

/// Outcome of dispatching one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: Phase,
    pub mode: ExecutionMode,
    pub status: PhaseStatus,
    /// Agents actually dispatched, primary first.
    pub agents_invoked: Vec<AgentKind>,
    /// `{"primary": <payload>, "secondaries": {"<agent>": <payload>}}`
    pub summary: Value,
    pub faults: Vec<AgentFault>,
    #[serde(skip)]
    pub duration: Duration,
}

impl PhaseResult {
    pub fn succeeded(&self) -> bool {
        self.status == PhaseStatus::Succeeded
    }

    /// Payload returned by the primary agent.
    pub fn primary_payload(&self) -> &Value {
        &self.summary["primary"]
    }
}

/// Merge the primary's output into the task payload.
///
/// Object outputs are merged key by key with the primary's keys winning;
/// any other output is stored under `"primary"`.
pub fn merge_payload(base: &Value, primary_output: &Value) -> Value {
    let mut merged = match base {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("task".to_string(), other.clone());
            map
        }
    };
    match primary_output {
        Value::Object(output) => {
            for (key, value) in output {
                merged.insert(key.clone(), value.clone());
            }
        }
        Value::Null => {}
        other => {
            merged.insert("primary".to_string(), other.clone());
        }
    }
    Value::Object(merged)
}

type Invocation = (AgentKind, Result<Value, AgentFault>);

/// Dispatches phases to the agent pool.
#[derive(Debug, Clone)]
pub struct PhaseRouter {
    pool: AgentPool,
    default_timeout: Duration,
}

impl PhaseRouter {
    pub fn new(pool: AgentPool, default_timeout: Duration) -> Self {
        Self {
            pool,
            default_timeout,
        }
    }

    pub fn pool(&self) -> &AgentPool {
        &self.pool
    }

    /// Dispatch a phase without secondary fan-out.
    pub async fn dispatch(&self, phase: Phase, payload: &Value) -> PhaseResult {
        self.dispatch_with(phase, payload, false).await
    }

    /// Dispatch a phase. With `fanout`, secondaries of a sequential phase run
    /// concurrently once the primary has finished.
    pub async fn dispatch_with(&self, phase: Phase, payload: &Value, fanout: bool) -> PhaseResult {
        let start = Instant::now();
        let route = route(phase);
        tracing::debug!(phase = %phase, mode = %route.mode, fanout, "dispatching phase");

        let mut result = match route.mode {
            ExecutionMode::Parallel => self.run_parallel(phase, &route, payload).await,
            ExecutionMode::Sequential => self.run_sequential(phase, &route, payload, fanout).await,
        };
        result.duration = start.elapsed();

        for fault in &result.faults {
            tracing::warn!(phase = %phase, agent = %fault.agent, kind = %fault.kind, "{}", fault.message);
        }
        result
    }

    async fn run_parallel(&self, phase: Phase, route: &Route, payload: &Value) -> PhaseResult {
        let agents = route.agents();
        let results = join_all(agents.iter().map(|kind| self.invoke(phase, *kind, payload))).await;
        let primary_ok = matches!(results.first(), Some((_, Ok(_))));
        self.collect(phase, route, agents, results, primary_ok)
    }

    async fn run_sequential(
        &self,
        phase: Phase,
        route: &Route,
        payload: &Value,
        fanout: bool,
    ) -> PhaseResult {
        let primary = self.invoke(phase, route.primary, payload).await;
        let primary_output = match &primary.1 {
            Ok(output) => output.clone(),
            Err(_) => return self.collect(phase, route, vec![route.primary], vec![primary], false),
        };
        let merged = merge_payload(payload, &primary_output);

        let mut invoked = vec![route.primary];
        let mut results = vec![primary];
        if fanout {
            let secondaries = join_all(
                route
                    .secondaries
                    .iter()
                    .map(|kind| self.invoke(phase, *kind, &merged)),
            )
            .await;
            invoked.extend(route.secondaries.iter().copied());
            results.extend(secondaries);
        } else {
            for kind in route.secondaries {
                let outcome = self.invoke(phase, *kind, &merged).await;
                let failed = outcome.1.is_err();
                invoked.push(*kind);
                results.push(outcome);
                if failed {
                    break;
                }
            }
        }

        let all_ok = results.iter().all(|(_, r)| r.is_ok());
        self.collect(phase, route, invoked, results, all_ok)
    }

    fn collect(
        &self,
        phase: Phase,
        route: &Route,
        agents_invoked: Vec<AgentKind>,
        results: Vec<Invocation>,
        succeeded: bool,
    ) -> PhaseResult {
        let mut primary = Value::Null;
        let mut secondaries = Map::new();
        let mut faults = Vec::new();
        for (kind, outcome) in results {
            match outcome {
                Ok(output) if kind == route.primary && primary.is_null() => primary = output,
                Ok(output) => {
                    secondaries.insert(kind.as_str().to_string(), output);
                }
                Err(fault) => faults.push(fault),
            }
        }

        let mut summary = Map::new();
        summary.insert("primary".to_string(), primary);
        summary.insert("secondaries".to_string(), Value::Object(secondaries));

        PhaseResult {
            phase,
            mode: route.mode,
            status: if succeeded {
                PhaseStatus::Succeeded
            } else {
                PhaseStatus::Failed
            },
            agents_invoked,
            summary: Value::Object(summary),
            faults,
            duration: Duration::ZERO,
        }
    }

    async fn invoke(&self, phase: Phase, kind: AgentKind, payload: &Value) -> Invocation {
        let Some(agent) = self.pool.get(kind) else {
            return (
                kind,
                Err(AgentFault::new(kind, FaultKind::Unavailable, "no agent registered").in_phase(phase)),
            );
        };
        let limit = self.pool.timeout_for(kind).unwrap_or(self.default_timeout);

        let outcome = match tokio::time::timeout(limit, agent.invoke(payload)).await {
            Err(_) => Err(AgentFault::new(
                kind,
                FaultKind::Timeout,
                format!("timed out after {}ms", limit.as_millis()),
            )),
            Ok(Err(e)) => Err(AgentFault::new(kind, FaultKind::Error, format!("{:#}", e))),
            Ok(Ok(output)) if !output.success => Err(AgentFault::new(
                kind,
                FaultKind::Reported,
                output
                    .fault
                    .unwrap_or_else(|| "agent reported failure".to_string()),
            )),
            Ok(Ok(output)) => Ok(output.payload),
        };
        (kind, outcome.map_err(|f| f.in_phase(phase)))
    }
}
