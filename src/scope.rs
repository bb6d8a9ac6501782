//! Scope provider: turns a target path into tagged scope units.
//!
//! A scope is an enumerable set of file-like units, each tagged with the
//! operation kinds and domains detected in its relative path. An optional
//! free-text task description is tagged once for the whole scope and
//! counts toward the initial signal only.

use anyhow::{Context, Result};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use walkdir::WalkDir;

/// Keyword fragment → operation tag.
const OPERATION_KEYWORDS: &[(&str, &str)] = &[
    ("optimiz", "optimization"),
    ("refactor", "refactoring"),
    ("secur", "security"),
    ("perf", "performance"),
    ("quality", "quality"),
    ("test", "testing"),
    ("doc", "documentation"),
];

/// Domain tag → keyword fragments.
const DOMAIN_KEYWORDS: &[(&str, &[&str])] = &[
    ("frontend", &["ui", "component", "react", "vue"]),
    ("backend", &["api", "server", "database", "endpoint"]),
    ("infrastructure", &["docker", "kubernetes", "deploy"]),
    ("security", &["auth", "vulnerab", "encrypt"]),
    ("data", &["etl", "pipeline", "analytics"]),
];

/// Include/exclude patterns applied while scanning a directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    #[serde(default = "default_include")]
    pub include: Vec<String>,
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

fn default_include() -> Vec<String> {
    vec!["**/*".to_string()]
}

fn default_exclude() -> Vec<String> {
    vec![
        "**/target/**".to_string(),
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/.wave/**".to_string(),
    ]
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: default_exclude(),
        }
    }
}

impl ScopeConfig {
    fn compile(patterns: &[String]) -> Result<Vec<Pattern>> {
        patterns
            .iter()
            .map(|p| Pattern::new(p).with_context(|| format!("Invalid scope pattern '{}'", p)))
            .collect()
    }
}

/// One file-like unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeUnit {
    /// Path relative to the scanned root (forward slashes).
    pub path: String,
    pub operation_tags: BTreeSet<String>,
    pub domain_tags: BTreeSet<String>,
}

impl ScopeUnit {
    /// Build a unit, tagging it from its path.
    pub fn tagged(path: &str) -> Self {
        let haystack = path.to_lowercase();
        Self {
            path: path.to_string(),
            operation_tags: detect_operations(&haystack),
            domain_tags: detect_domains(&haystack),
        }
    }
}

/// Operation tags whose keywords appear in `text` (already lowercased).
pub fn detect_operations(text: &str) -> BTreeSet<String> {
    OPERATION_KEYWORDS
        .iter()
        .filter(|(keyword, _)| text.contains(keyword))
        .map(|(_, tag)| tag.to_string())
        .collect()
}

/// Domain tags whose keywords appear in `text` (already lowercased).
pub fn detect_domains(text: &str) -> BTreeSet<String> {
    DOMAIN_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| text.contains(kw)))
        .map(|(domain, _)| domain.to_string())
        .collect()
}

/// A snapshot of the units a wave works on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub units: Vec<ScopeUnit>,
    /// Operation tags of the task description.
    #[serde(default)]
    pub task_operations: BTreeSet<String>,
    /// Domain tags of the task description.
    #[serde(default)]
    pub task_domains: BTreeSet<String>,
}

impl Scope {
    pub fn new(units: Vec<ScopeUnit>) -> Self {
        Self {
            units,
            ..Self::default()
        }
    }

    /// Tag the scope with a task description.
    pub fn with_description(mut self, description: Option<&str>) -> Self {
        let text = description.unwrap_or_default().to_lowercase();
        self.task_operations = detect_operations(&text);
        self.task_domains = detect_domains(&text);
        self
    }

    /// Scan a file or directory into a scope.
    pub fn scan(target: &Path, description: Option<&str>, config: &ScopeConfig) -> Result<Self> {
        if !target.exists() {
            anyhow::bail!("Scope target does not exist: {}", target.display());
        }

        if target.is_file() {
            let name = target
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            return Ok(Self::new(vec![ScopeUnit::tagged(&name)]).with_description(description));
        }

        let include = ScopeConfig::compile(&config.include)?;
        let exclude = ScopeConfig::compile(&config.exclude)?;

        let mut units = Vec::new();
        for entry in WalkDir::new(target).sort_by_file_name() {
            let entry = entry
                .with_context(|| format!("Failed to walk scope target {}", target.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(target)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");

            if !include.iter().any(|p| p.matches(&relative)) {
                continue;
            }
            if exclude.iter().any(|p| p.matches(&relative)) {
                continue;
            }
            units.push(ScopeUnit::tagged(&relative));
        }

        tracing::debug!(target = %target.display(), units = units.len(), "scanned scope");
        Ok(Self::new(units).with_description(description))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn paths(&self) -> Vec<String> {
        self.units.iter().map(|u| u.path.clone()).collect()
    }

    /// Units not in `processed`. Task tags carry over.
    pub fn remaining(&self, processed: &HashSet<String>) -> Scope {
        Scope {
            units: self
                .units
                .iter()
                .filter(|u| !processed.contains(&u.path))
                .cloned()
                .collect(),
            task_operations: self.task_operations.clone(),
            task_domains: self.task_domains.clone(),
        }
    }
}
