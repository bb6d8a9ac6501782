//! Worker agent pool.
//!
//! The pool maps each `AgentKind` to the implementation that serves it plus
//! an optional per-agent time limit. Two implementations ship with the
//! crate:
//!
//! - `CommandAgent` runs an external program, hands it the task payload as
//!   JSON on stdin and parses an `AgentOutput` from its stdout.
//! - `EchoAgent` succeeds immediately, echoing the payload back. Dry runs
//!   register it for every kind.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use wave_common::{AgentKind, AgentOutput, WorkerAgent};

use crate::config::AgentCommandConfig;

/// A registered agent and its optional time limit.
#[derive(Clone)]
struct PoolEntry {
    agent: Arc<dyn WorkerAgent>,
    timeout: Option<Duration>,
}

/// Registry of worker agents keyed by identity.
#[derive(Clone, Default)]
pub struct AgentPool {
    entries: HashMap<AgentKind, PoolEntry>,
}

impl AgentPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent, replacing any previous one for the same kind.
    pub fn register(mut self, kind: AgentKind, agent: Arc<dyn WorkerAgent>) -> Self {
        self.entries.insert(
            kind,
            PoolEntry {
                agent,
                timeout: None,
            },
        );
        self
    }

    /// Register an agent with its own time limit.
    pub fn register_with_timeout(
        mut self,
        kind: AgentKind,
        agent: Arc<dyn WorkerAgent>,
        timeout: Duration,
    ) -> Self {
        self.entries.insert(
            kind,
            PoolEntry {
                agent,
                timeout: Some(timeout),
            },
        );
        self
    }

    /// A pool with an `EchoAgent` for every kind.
    pub fn echo() -> Self {
        AgentKind::ALL.iter().fold(Self::new(), |pool, kind| {
            pool.register(*kind, Arc::new(EchoAgent::new(*kind)))
        })
    }

    /// Build a pool of `CommandAgent`s from the `[agents.*]` config tables.
    ///
    /// Unknown agent names are an error; kinds without a table stay
    /// unregistered and fault when dispatched.
    pub fn from_config(agents: &BTreeMap<String, AgentCommandConfig>) -> Result<Self> {
        let mut pool = Self::new();
        for (name, cfg) in agents {
            let kind: AgentKind = name
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .with_context(|| format!("Invalid [agents.{}] table", name))?;
            let agent = Arc::new(CommandAgent::from_config(kind, cfg));
            pool = match cfg.timeout_secs {
                Some(secs) => pool.register_with_timeout(kind, agent, Duration::from_secs(secs)),
                None => pool.register(kind, agent),
            };
        }
        Ok(pool)
    }

    pub fn get(&self, kind: AgentKind) -> Option<Arc<dyn WorkerAgent>> {
        self.entries.get(&kind).map(|e| Arc::clone(&e.agent))
    }

    /// Per-agent time limit, if one was registered.
    pub fn timeout_for(&self, kind: AgentKind) -> Option<Duration> {
        self.entries.get(&kind).and_then(|e| e.timeout)
    }

    /// Registered kinds in a stable order.
    pub fn kinds(&self) -> Vec<AgentKind> {
        let mut kinds: Vec<_> = self.entries.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl std::fmt::Debug for AgentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPool")
            .field("agents", &self.kinds())
            .finish()
    }
}

/// Agent that succeeds without doing any work.
#[derive(Debug, Clone)]
pub struct EchoAgent {
    kind: AgentKind,
}

impl EchoAgent {
    pub fn new(kind: AgentKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl WorkerAgent for EchoAgent {
    async fn invoke(&self, payload: &Value) -> Result<AgentOutput> {
        Ok(AgentOutput::ok(json!({
            "agent": self.kind.as_str(),
            "phase": payload.get("phase").cloned().unwrap_or(Value::Null),
            "iteration": payload.get("iteration").cloned().unwrap_or(Value::Null),
        })))
    }
}

/// Agent backed by an external program.
///
/// The program receives the task payload as a single JSON document on stdin
/// and must print one JSON `AgentOutput` on stdout. A non-zero exit status
/// or unparseable output is an error. The child is killed when the
/// invocation future is dropped (timeout or cancellation).
#[derive(Debug, Clone)]
pub struct CommandAgent {
    kind: AgentKind,
    command: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandAgent {
    pub fn new(kind: AgentKind, command: impl Into<String>) -> Self {
        Self {
            kind,
            command: command.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn from_config(kind: AgentKind, config: &AgentCommandConfig) -> Self {
        Self {
            kind,
            command: config.command.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.clone(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

#[async_trait]
impl WorkerAgent for CommandAgent {
    async fn invoke(&self, payload: &Value) -> Result<AgentOutput> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {} agent '{}'", self.kind, self.command))?;

        let input = serde_json::to_vec(payload).context("Failed to serialize task payload")?;
        let mut stdin = child.stdin.take().context("Failed to get stdin")?;
        let mut stdout = child.stdout.take().context("Failed to get stdout")?;

        // Both pipes are bounded; feed and drain them together.
        let write = async move {
            stdin.write_all(&input).await?;
            stdin.shutdown().await
        };
        let mut output = String::new();
        let (written, read) = tokio::join!(write, stdout.read_to_string(&mut output));
        written.context("Failed to write payload to stdin")?;
        read.context("Failed to read agent output")?;

        let status = child.wait().await.context("Failed to wait for agent process")?;
        if !status.success() {
            anyhow::bail!(
                "{} agent exited with code {}",
                self.kind,
                status.code().unwrap_or(-1)
            );
        }

        serde_json::from_str(output.trim())
            .with_context(|| format!("Unparseable output from {} agent", self.kind))
    }
}
