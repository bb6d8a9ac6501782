//! Scripted worker agents and stores shared by unit tests.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wave_common::{
    AgentKind, AgentOutput, Checkpoint, NewCheckpoint, PhaseExecution, WaveRecord, WorkerAgent,
};

use crate::agents::AgentPool;
use crate::errors::StoreError;
use crate::store::{MemoryStore, WaveStore};

/// One scripted reaction of a `ScriptedAgent`.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed(Value),
    Report(&'static str),
    Error(&'static str),
    Hang,
}

/// Agent that replays a script, then succeeds with its fallback payload.
pub struct ScriptedAgent {
    kind: AgentKind,
    script: Mutex<VecDeque<Step>>,
    fallback: Mutex<Option<Step>>,
    calls: AtomicU32,
    seen: Mutex<Vec<Value>>,
}

impl ScriptedAgent {
    pub fn new(kind: AgentKind) -> Arc<Self> {
        Self::with_script(kind, Vec::new())
    }

    pub fn with_script(kind: AgentKind, steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            script: Mutex::new(steps.into()),
            fallback: Mutex::new(None),
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Agent whose every invocation follows `step`.
    pub fn always(kind: AgentKind, step: Step) -> Arc<Self> {
        let agent = Self::new(kind);
        *agent.fallback.lock().unwrap() = Some(step);
        agent
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Value> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerAgent for ScriptedAgent {
    async fn invoke(&self, payload: &Value) -> Result<AgentOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(payload.clone());
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.lock().unwrap().clone());

        match step {
            Some(Step::Succeed(value)) => Ok(AgentOutput::ok(value)),
            Some(Step::Report(msg)) => Ok(AgentOutput::failed(msg)),
            Some(Step::Error(msg)) => Err(anyhow::anyhow!(msg)),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(AgentOutput::ok(Value::Null))
            }
            None => Ok(AgentOutput::ok(json!({ "agent": self.kind.as_str() }))),
        }
    }
}

/// Scripted agents for every kind, plus a pool serving them.
pub struct Fleet {
    pub quality: Arc<ScriptedAgent>,
    pub performance: Arc<ScriptedAgent>,
    pub security: Arc<ScriptedAgent>,
    pub monitor: Arc<ScriptedAgent>,
}

impl Fleet {
    pub fn healthy() -> Self {
        Self {
            quality: ScriptedAgent::new(AgentKind::Quality),
            performance: ScriptedAgent::new(AgentKind::Performance),
            security: ScriptedAgent::new(AgentKind::Security),
            monitor: ScriptedAgent::new(AgentKind::Monitor),
        }
    }

    pub fn with(mut self, agent: Arc<ScriptedAgent>) -> Self {
        match agent.kind {
            AgentKind::Quality => self.quality = agent,
            AgentKind::Performance => self.performance = agent,
            AgentKind::Security => self.security = agent,
            AgentKind::Monitor => self.monitor = agent,
        }
        self
    }

    pub fn pool(&self) -> AgentPool {
        AgentPool::new()
            .register(AgentKind::Quality, self.quality.clone())
            .register(AgentKind::Performance, self.performance.clone())
            .register(AgentKind::Security, self.security.clone())
            .register(AgentKind::Monitor, self.monitor.clone())
    }
}

/// Memory store that can be told to reject one kind of write.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    reject_inserts: bool,
    reject_updates: bool,
    reject_checkpoints: bool,
}

impl FlakyStore {
    pub fn rejecting_inserts() -> Self {
        Self {
            reject_inserts: true,
            ..Self::default()
        }
    }

    pub fn rejecting_updates() -> Self {
        Self {
            reject_updates: true,
            ..Self::default()
        }
    }

    pub fn rejecting_checkpoints() -> Self {
        Self {
            reject_checkpoints: true,
            ..Self::default()
        }
    }
}

impl WaveStore for FlakyStore {
    fn insert_wave(&self, record: &WaveRecord) -> Result<(), StoreError> {
        if self.reject_inserts {
            return Err(StoreError::Rejected("read-only database".to_string()));
        }
        self.inner.insert_wave(record)
    }

    fn update_wave(&self, record: &WaveRecord) -> Result<(), StoreError> {
        if self.reject_updates {
            return Err(StoreError::Rejected("disk full".to_string()));
        }
        self.inner.update_wave(record)
    }

    fn get_wave(&self, wave_id: &str) -> Result<Option<WaveRecord>, StoreError> {
        self.inner.get_wave(wave_id)
    }

    fn list_waves(&self) -> Result<Vec<WaveRecord>, StoreError> {
        self.inner.list_waves()
    }

    fn insert_phase_execution(&self, execution: &PhaseExecution) -> Result<(), StoreError> {
        self.inner.insert_phase_execution(execution)
    }

    fn phase_executions(&self, wave_id: &str) -> Result<Vec<PhaseExecution>, StoreError> {
        self.inner.phase_executions(wave_id)
    }

    fn append_checkpoint(&self, checkpoint: &NewCheckpoint) -> Result<Checkpoint, StoreError> {
        if self.reject_checkpoints {
            return Err(StoreError::Rejected("disk full".to_string()));
        }
        self.inner.append_checkpoint(checkpoint)
    }

    fn checkpoints(&self, wave_id: &str) -> Result<Vec<Checkpoint>, StoreError> {
        self.inner.checkpoints(wave_id)
    }
}
