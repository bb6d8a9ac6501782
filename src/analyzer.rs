//! Complexity analyzer.
//!
//! The score is a weighted blend of three capped, normalized terms:
//!
//! ```text
//! score = file_weight      * min(files / file_cap, 1)
//!       + operation_weight * min(distinct_ops / operation_cap, 1)
//!       + domain_weight    * min(distinct_domains / domain_cap, 1)
//! ```
//!
//! With non-negative weights summing to at most 1 the score stays in [0, 1]
//! and never decreases as any of the three inputs grows. The result is
//! clamped anyway so a misconfigured weight set cannot escape the range.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use wave_common::ComplexitySignal;

use crate::scope::Scope;

/// Weights and caps of the complexity formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityWeights {
    #[serde(default = "default_file_weight")]
    pub file_weight: f64,
    #[serde(default = "default_operation_weight")]
    pub operation_weight: f64,
    #[serde(default = "default_domain_weight")]
    pub domain_weight: f64,
    #[serde(default = "default_file_cap")]
    pub file_cap: usize,
    #[serde(default = "default_operation_cap")]
    pub operation_cap: usize,
    #[serde(default = "default_domain_cap")]
    pub domain_cap: usize,
}

fn default_file_weight() -> f64 {
    0.5
}

fn default_operation_weight() -> f64 {
    0.3
}

fn default_domain_weight() -> f64 {
    0.2
}

fn default_file_cap() -> usize {
    200
}

fn default_operation_cap() -> usize {
    5
}

fn default_domain_cap() -> usize {
    5
}

impl Default for ComplexityWeights {
    fn default() -> Self {
        Self {
            file_weight: default_file_weight(),
            operation_weight: default_operation_weight(),
            domain_weight: default_domain_weight(),
            file_cap: default_file_cap(),
            operation_cap: default_operation_cap(),
            domain_cap: default_domain_cap(),
        }
    }
}

impl ComplexityWeights {
    /// Warnings for weight sets that break the formula's guarantees.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let weights = [self.file_weight, self.operation_weight, self.domain_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            warnings.push("complexity weights must be finite and non-negative".to_string());
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            warnings.push(format!("complexity weights sum to {:.3}, expected 1.0", sum));
        }
        if self.file_cap == 0 || self.operation_cap == 0 || self.domain_cap == 0 {
            warnings.push("complexity caps must be greater than zero".to_string());
        }
        warnings
    }
}

fn scaled(count: usize, cap: usize) -> f64 {
    if cap == 0 {
        return if count > 0 { 1.0 } else { 0.0 };
    }
    (count as f64 / cap as f64).min(1.0)
}

/// Score raw counts with the given weights.
pub fn complexity_score(
    file_count: usize,
    operation_count: usize,
    domain_count: usize,
    weights: &ComplexityWeights,
) -> f64 {
    let score = weights.file_weight * scaled(file_count, weights.file_cap)
        + weights.operation_weight * scaled(operation_count, weights.operation_cap)
        + weights.domain_weight * scaled(domain_count, weights.domain_cap);
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Analyze a scope snapshot, task description included. Pure; an empty
/// scope without a description scores zero.
pub fn analyze(scope: &Scope, weights: &ComplexityWeights) -> ComplexitySignal {
    signal(scope, weights, true)
}

/// Analyze only what the remaining units themselves carry. Used between
/// adaptive iterations, where the description was already accounted for.
pub fn analyze_residual(scope: &Scope, weights: &ComplexityWeights) -> ComplexitySignal {
    signal(scope, weights, false)
}

fn signal(scope: &Scope, weights: &ComplexityWeights, with_task: bool) -> ComplexitySignal {
    let mut operation_types = BTreeSet::new();
    let mut domains = BTreeSet::new();
    for unit in &scope.units {
        operation_types.extend(unit.operation_tags.iter().cloned());
        domains.extend(unit.domain_tags.iter().cloned());
    }
    if with_task {
        operation_types.extend(scope.task_operations.iter().cloned());
        domains.extend(scope.task_domains.iter().cloned());
    }

    let file_count = scope.len();
    ComplexitySignal {
        complexity_score: complexity_score(
            file_count,
            operation_types.len(),
            domains.len(),
            weights,
        ),
        file_count,
        operation_types,
        domains,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeUnit;

    fn unit(path: &str, ops: &[&str], domains: &[&str]) -> ScopeUnit {
        ScopeUnit {
            path: path.to_string(),
            operation_tags: ops.iter().map(|s| s.to_string()).collect(),
            domain_tags: domains.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_empty_scope_scores_zero() {
        let signal = analyze(&Scope::default(), &ComplexityWeights::default());
        assert_eq!(signal.complexity_score, 0.0);
        assert_eq!(signal.file_count, 0);
        assert!(signal.operation_types.is_empty());
        assert!(signal.domains.is_empty());
    }

    #[test]
    fn test_analyze_collects_distinct_tags() {
        let scope = Scope::new(vec![
            unit("a.rs", &["refactoring"], &["backend"]),
            unit("b.rs", &["refactoring", "testing"], &["backend", "data"]),
        ]);
        let signal = analyze(&scope, &ComplexityWeights::default());
        assert_eq!(signal.file_count, 2);
        assert_eq!(signal.operation_types.len(), 2);
        assert_eq!(signal.domains.len(), 2);
        // 0.5 * 2/200 + 0.3 * 2/5 + 0.2 * 2/5
        assert!((signal.complexity_score - 0.205).abs() < 1e-9);
    }

    #[test]
    fn test_residual_ignores_task_tags() {
        let scope = Scope::new(vec![unit("README", &[], &[])])
            .with_description(Some("refactor the api and optimize tests"));

        let initial = analyze(&scope, &ComplexityWeights::default());
        assert_eq!(initial.operation_types.len(), 3);
        assert!(initial.domains.contains("backend"));

        let residual = analyze_residual(&scope, &ComplexityWeights::default());
        assert_eq!(residual.file_count, 1);
        assert!(residual.operation_types.is_empty());
        assert!(residual.domains.is_empty());
        // 0.5 * 1/200
        assert!((residual.complexity_score - 0.0025).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_bounded() {
        let w = ComplexityWeights::default();
        assert_eq!(complexity_score(10_000, 50, 50, &w), 1.0);

        let skewed = ComplexityWeights {
            file_weight: 3.0,
            ..ComplexityWeights::default()
        };
        assert_eq!(complexity_score(10_000, 0, 0, &skewed), 1.0);
    }

    #[test]
    fn test_score_is_monotonic_in_each_input() {
        let w = ComplexityWeights::default();
        let mut previous = 0.0;
        for files in [0, 1, 10, 100, 199, 200, 500] {
            let s = complexity_score(files, 1, 1, &w);
            assert!(s >= previous, "files={} dropped score", files);
            previous = s;
        }
        previous = 0.0;
        for ops in 0..8 {
            let s = complexity_score(5, ops, 1, &w);
            assert!(s >= previous);
            previous = s;
        }
        previous = 0.0;
        for domains in 0..8 {
            let s = complexity_score(5, 1, domains, &w);
            assert!(s >= previous);
            previous = s;
        }
    }

    #[test]
    fn test_weights_validation() {
        assert!(ComplexityWeights::default().validate().is_empty());

        let bad = ComplexityWeights {
            file_weight: 0.9,
            file_cap: 0,
            ..ComplexityWeights::default()
        };
        let warnings = bad.validate();
        assert_eq!(warnings.len(), 2);
    }
}
