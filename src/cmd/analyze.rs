//! Complexity analysis without execution (`wave analyze`).

use std::path::Path;

use anyhow::Result;
use serde_json::json;

use wave_orchestrator::analyzer;
use wave_orchestrator::config::WaveConfig;
use wave_orchestrator::scope::Scope;
use wave_orchestrator::strategy;

use super::print_json;

pub fn cmd_analyze(
    config: &WaveConfig,
    json: bool,
    target: &Path,
    describe: Option<&str>,
) -> Result<()> {
    let scope = Scope::scan(target, describe, &config.toml.scope)?;
    let signal = analyzer::analyze(&scope, &config.toml.complexity);
    let plan = strategy::plan(&signal, &config.toml.orchestrator);

    if json {
        return print_json(&json!({
            "signal": signal,
            "strategy": plan.strategy,
            "phases": plan.phases,
            "max_iterations": plan.iterations.max_iterations(),
            "checkpoint_granularity": plan.checkpoint_granularity,
            "parallel_fanout": plan.parallel_fanout,
            "rollback_enabled": plan.rollback_enabled,
        }));
    }

    println!();
    println!("{}", console::style("Complexity Analysis").bold().cyan());
    println!();
    println!("  Target:      {}", target.display());
    println!("  Files:       {}", signal.file_count);
    println!("  Score:       {:.3}", signal.complexity_score);
    println!("  Operations:  {}", join_or_none(&signal.operation_types));
    println!("  Domains:     {}", join_or_none(&signal.domains));
    println!();
    println!(
        "  Strategy:    {}",
        console::style(plan.strategy.as_str()).green().bold()
    );
    let phases: Vec<&str> = plan.phases.iter().map(|p| p.as_str()).collect();
    println!("  Phases:      {}", phases.join(" → "));
    println!("  Iterations:  up to {}", plan.iterations.max_iterations());
    println!("  Checkpoints: {}", plan.checkpoint_granularity);
    println!();
    Ok(())
}

fn join_or_none<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    let joined: Vec<&str> = items.into_iter().map(String::as_str).collect();
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined.join(", ")
    }
}
