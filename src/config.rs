//! Unified configuration for the wave orchestrator.
//!
//! Settings are read from `.wave/wave.toml` and layered:
//! file → environment (`.env` is loaded first) → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [orchestrator]
//! max_phase_retries = 2
//! agent_timeout_secs = 300
//! progressive_iterations = 3
//! adaptive_max_iterations = 5
//! adaptive_low_water = 0.3
//! rollback_enabled = true
//!
//! [complexity]
//! file_weight = 0.5
//! operation_weight = 0.3
//! domain_weight = 0.2
//!
//! [scope]
//! include = ["**/*"]
//! exclude = ["**/target/**"]
//!
//! [store]
//! path = ".wave/waves.db"
//!
//! [logging]
//! json = false
//! file = true
//!
//! [agents.security]
//! command = "security-agent"
//! args = ["--json"]
//! timeout_secs = 120
//! ```
//!
//! Environment overrides: `WAVE_DB_PATH`, `WAVE_MAX_PHASE_RETRIES`,
//! `WAVE_AGENT_TIMEOUT_SECS`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use wave_common::AgentKind;

use crate::analyzer::ComplexityWeights;
use crate::scope::ScopeConfig;

/// Name of the per-project state directory.
pub const WAVE_DIR: &str = ".wave";

/// Control-flow constants of the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Re-dispatches of a failed phase before it is declared permanently failed.
    #[serde(default = "default_max_phase_retries")]
    pub max_phase_retries: u32,
    /// Default limit for one agent invocation.
    #[serde(default = "default_agent_timeout_secs")]
    pub agent_timeout_secs: u64,
    /// Iterations of the progressive strategy.
    #[serde(default = "default_progressive_iterations")]
    pub progressive_iterations: u32,
    /// Upper bound on adaptive iterations.
    #[serde(default = "default_adaptive_max_iterations")]
    pub adaptive_max_iterations: u32,
    /// Residual score below which adaptive waves shrink to review + validation.
    #[serde(default = "default_adaptive_low_water")]
    pub adaptive_low_water: f64,
    /// Whether checkpoints may be used as rollback targets.
    #[serde(default = "default_rollback_enabled")]
    pub rollback_enabled: bool,
}

fn default_max_phase_retries() -> u32 {
    2
}

fn default_agent_timeout_secs() -> u64 {
    300
}

fn default_progressive_iterations() -> u32 {
    3
}

fn default_adaptive_max_iterations() -> u32 {
    5
}

fn default_adaptive_low_water() -> f64 {
    0.3
}

fn default_rollback_enabled() -> bool {
    true
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_phase_retries: default_max_phase_retries(),
            agent_timeout_secs: default_agent_timeout_secs(),
            progressive_iterations: default_progressive_iterations(),
            adaptive_max_iterations: default_adaptive_max_iterations(),
            adaptive_low_water: default_adaptive_low_water(),
            rollback_enabled: default_rollback_enabled(),
        }
    }
}

impl OrchestratorSettings {
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    /// Attempts per phase, the first dispatch included.
    pub fn max_attempts(&self) -> u32 {
        self.max_phase_retries.saturating_add(1)
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    /// SQLite database path, relative to the project directory.
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    format!("{}/waves.db", WAVE_DIR)
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
    /// Also write a daily-rolling log file under `.wave/logs/`.
    #[serde(default)]
    pub file: bool,
}

/// A worker agent backed by an external program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCommandConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Per-agent limit; falls back to `orchestrator.agent_timeout_secs`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// The complete wave.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaveToml {
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    #[serde(default)]
    pub complexity: ComplexityWeights,
    #[serde(default)]
    pub scope: ScopeConfig,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub logging: LoggingSection,
    /// Agent programs keyed by agent name (`quality`, `security`, ...).
    #[serde(default)]
    pub agents: BTreeMap<String, AgentCommandConfig>,
}

impl WaveToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse wave.toml")
    }

    /// Load `wave.toml` from the wave directory, or defaults if absent.
    pub fn load_or_default(wave_dir: &Path) -> Result<Self> {
        let config_path = wave_dir.join("wave.toml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize wave.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply overrides from an environment-like lookup.
    ///
    /// Returns warnings for values that could not be parsed; those
    /// overrides are skipped.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();
        if let Some(path) = lookup("WAVE_DB_PATH") {
            self.store.path = path;
        }
        if let Some(raw) = lookup("WAVE_MAX_PHASE_RETRIES") {
            match raw.parse() {
                Ok(v) => self.orchestrator.max_phase_retries = v,
                Err(_) => warnings.push(format!("Ignoring WAVE_MAX_PHASE_RETRIES='{}'", raw)),
            }
        }
        if let Some(raw) = lookup("WAVE_AGENT_TIMEOUT_SECS") {
            match raw.parse() {
                Ok(v) => self.orchestrator.agent_timeout_secs = v,
                Err(_) => warnings.push(format!("Ignoring WAVE_AGENT_TIMEOUT_SECS='{}'", raw)),
            }
        }
        warnings
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.complexity.validate();

        let low_water = self.orchestrator.adaptive_low_water;
        if !(0.0..=1.0).contains(&low_water) {
            warnings.push(format!(
                "adaptive_low_water {} is outside [0, 1]",
                low_water
            ));
        }
        if self.orchestrator.progressive_iterations == 0 {
            warnings.push(
                "progressive_iterations must be at least 1; treating 0 as 1".to_string(),
            );
        }
        if self.orchestrator.adaptive_max_iterations == 0 {
            warnings.push(
                "adaptive_max_iterations must be at least 1; treating 0 as 1".to_string(),
            );
        }
        if self.orchestrator.agent_timeout_secs == 0 {
            warnings.push("agent_timeout_secs must be greater than zero".to_string());
        }
        for name in self.agents.keys() {
            if name.parse::<AgentKind>().is_err() {
                warnings.push(format!(
                    "Unknown agent '{}'. Valid agents: quality, performance, security, monitor",
                    name
                ));
            }
        }
        warnings
    }
}

/// Resolved configuration for one project directory.
#[derive(Debug, Clone)]
pub struct WaveConfig {
    pub project_dir: PathBuf,
    pub wave_dir: PathBuf,
    pub toml: WaveToml,
    pub verbose: bool,
    /// Warnings produced while applying environment overrides.
    pub env_warnings: Vec<String>,
}

impl WaveConfig {
    /// Load configuration for a project directory.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let wave_dir = project_dir.join(WAVE_DIR);

        // A missing .env is the common case.
        let _ = dotenvy::from_path(project_dir.join(".env"));

        let mut toml = WaveToml::load_or_default(&wave_dir)?;
        let env_warnings = toml.apply_overrides(|key| std::env::var(key).ok());

        Ok(Self {
            project_dir,
            wave_dir,
            toml,
            verbose: false,
            env_warnings,
        })
    }

    /// Load configuration with CLI overrides.
    pub fn with_cli_args(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.verbose = verbose;
        Ok(config)
    }

    pub fn config_file(&self) -> PathBuf {
        self.wave_dir.join("wave.toml")
    }

    /// Database path, resolved against the project directory.
    pub fn db_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.toml.store.path);
        if path.is_absolute() {
            path
        } else {
            self.project_dir.join(path)
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.wave_dir.join("logs")
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.wave_dir)
            .with_context(|| format!("Failed to create {}", self.wave_dir.display()))?;
        if let Some(parent) = self.db_path().parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.env_warnings.clone();
        warnings.extend(self.toml.validate());
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let toml = WaveToml::default();
        assert_eq!(toml.orchestrator.max_phase_retries, 2);
        assert_eq!(toml.orchestrator.max_attempts(), 3);
        assert_eq!(toml.orchestrator.progressive_iterations, 3);
        assert_eq!(toml.orchestrator.adaptive_max_iterations, 5);
        assert_eq!(toml.orchestrator.agent_timeout(), Duration::from_secs(300));
        assert_eq!(toml.store.path, ".wave/waves.db");
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let toml = WaveToml::parse(
            r#"
            [orchestrator]
            max_phase_retries = 4

            [agents.quality]
            command = "quality-agent"
            args = ["--json"]
            "#,
        )
        .unwrap();
        assert_eq!(toml.orchestrator.max_phase_retries, 4);
        assert_eq!(toml.orchestrator.agent_timeout_secs, 300);
        let quality = &toml.agents["quality"];
        assert_eq!(quality.command, "quality-agent");
        assert_eq!(quality.args, vec!["--json".to_string()]);
        assert!(quality.timeout_secs.is_none());
    }

    #[test]
    fn test_parse_invalid_toml_errors() {
        assert!(WaveToml::parse("[orchestrator\nmax = ").is_err());
    }

    #[test]
    fn test_validate_flags_bad_values() {
        let mut toml = WaveToml::default();
        toml.orchestrator.adaptive_low_water = 1.5;
        toml.orchestrator.progressive_iterations = 0;
        toml.agents.insert(
            "architect".to_string(),
            AgentCommandConfig {
                command: "x".into(),
                args: Vec::new(),
                timeout_secs: None,
                working_dir: None,
            },
        );
        let warnings = toml.validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.contains("architect")));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("WAVE_DB_PATH", "/tmp/other.db"),
            ("WAVE_MAX_PHASE_RETRIES", "5"),
            ("WAVE_AGENT_TIMEOUT_SECS", "soon"),
        ]
        .into();
        let mut toml = WaveToml::default();
        let warnings = toml.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(toml.store.path, "/tmp/other.db");
        assert_eq!(toml.orchestrator.max_phase_retries, 5);
        assert_eq!(toml.orchestrator.agent_timeout_secs, 300);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wave.toml");
        let mut toml = WaveToml::default();
        toml.orchestrator.adaptive_low_water = 0.25;
        toml.save(&path).unwrap();

        let loaded = WaveToml::load(&path).unwrap();
        assert_eq!(loaded.orchestrator.adaptive_low_water, 0.25);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempdir().unwrap();
        let toml = WaveToml::load_or_default(dir.path()).unwrap();
        assert_eq!(toml.orchestrator.max_phase_retries, 2);
    }

    #[test]
    fn test_wave_config_resolves_relative_db_path() {
        let dir = tempdir().unwrap();
        let mut config = WaveConfig::new(dir.path().to_path_buf()).unwrap();
        config.toml.store.path = "data/w.db".into();
        assert_eq!(config.db_path(), config.project_dir.join("data/w.db"));
        config.toml.store.path = "/abs/w.db".into();
        assert_eq!(config.db_path(), PathBuf::from("/abs/w.db"));
    }
}
