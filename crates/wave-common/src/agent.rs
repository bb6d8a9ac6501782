//! Worker agent identities and the invocation contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::phase::Phase;

/// Identity of a specialized worker agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Quality,
    Performance,
    Security,
    Monitor,
}

impl AgentKind {
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Quality,
        AgentKind::Performance,
        AgentKind::Security,
        AgentKind::Monitor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Performance => "performance",
            Self::Security => "security",
            Self::Monitor => "monitor",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quality" => Ok(Self::Quality),
            "performance" => Ok(Self::Performance),
            "security" => Ok(Self::Security),
            "monitor" => Ok(Self::Monitor),
            _ => Err(format!("Invalid agent: {}", s)),
        }
    }
}

/// What a worker agent hands back from one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub success: bool,
    #[serde(default)]
    pub payload: Value,
    /// Agent-supplied failure description, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

impl AgentOutput {
    pub fn ok(payload: Value) -> Self {
        Self {
            success: true,
            payload,
            fault: None,
        }
    }

    pub fn failed(message: &str) -> Self {
        Self {
            success: false,
            payload: Value::Null,
            fault: Some(message.to_string()),
        }
    }
}

/// Why an agent invocation did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// The invocation itself errored (spawn failure, bad output, ...).
    Error,
    /// The invocation exceeded its time limit.
    Timeout,
    /// The agent ran but reported `success = false`.
    Reported,
    /// No agent is registered for the requested identity.
    Unavailable,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Reported => "reported",
            Self::Unavailable => "unavailable",
        }
    }
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed or timed-out agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{agent} agent fault ({kind}): {message}")]
pub struct AgentFault {
    pub agent: AgentKind,
    pub kind: FaultKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    /// 1-based attempt of the phase during which the fault occurred.
    #[serde(default)]
    pub attempt: u32,
}

impl AgentFault {
    pub fn new(agent: AgentKind, kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            agent,
            kind,
            message: message.into(),
            phase: None,
            attempt: 0,
        }
    }

    pub fn in_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn on_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }
}

/// An external capability invoked with a task payload.
///
/// Implementations: `CommandAgent` and `EchoAgent` in the orchestrator crate,
/// scripted doubles in tests. Returning `Err` and returning an output with
/// `success = false` are both failures; the router records either as an
/// [`AgentFault`].
#[async_trait]
pub trait WorkerAgent: Send + Sync {
    async fn invoke(&self, payload: &Value) -> anyhow::Result<AgentOutput>;
}
