//! Read-only views of persisted waves: `wave list`, `wave status`,
//! `wave checkpoints`, `wave rollback`.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;

use wave_common::{PhaseStatus, WaveFault, WaveOutcome, WaveRecord, WaveStatus};
use wave_orchestrator::checkpoint::CheckpointStore;
use wave_orchestrator::config::WaveConfig;
use wave_orchestrator::store::{SqliteStore, WaveStore};

use super::print_json;

fn open_store(config: &WaveConfig) -> Result<Arc<dyn WaveStore>> {
    let db_path = config.db_path();
    if !db_path.exists() {
        anyhow::bail!(
            "No wave database at {}. Run 'wave run' first.",
            db_path.display()
        );
    }
    let store = SqliteStore::new(&db_path)
        .with_context(|| format!("Failed to open wave database {}", db_path.display()))?;
    Ok(Arc::new(store))
}

fn load_outcome(store: &Arc<dyn WaveStore>, wave_id: &str) -> Result<(WaveRecord, WaveOutcome)> {
    let record = store
        .get_wave(wave_id)?
        .with_context(|| format!("Wave {} not found", wave_id))?;
    let final_checkpoint = CheckpointStore::new(Arc::clone(store))
        .latest_eligible(wave_id)?
        .map(|c| c.sequence_number);
    let outcome = WaveOutcome::from_record(&record, final_checkpoint);
    Ok((record, outcome))
}

/// Human-readable wave duration, `-` while the wave has no end time.
fn format_duration(record: &WaveRecord) -> String {
    match record.duration() {
        Some(d) if d.num_seconds() >= 60 => {
            format!("{}m {:02}s", d.num_minutes(), d.num_seconds() % 60)
        }
        Some(d) if d.num_seconds() >= 1 => {
            format!("{:.1}s", d.num_milliseconds() as f64 / 1000.0)
        }
        Some(d) => format!("{}ms", d.num_milliseconds()),
        None => "-".to_string(),
    }
}

fn duration_ms(record: &WaveRecord) -> Option<i64> {
    record.duration().map(|d| d.num_milliseconds())
}

pub fn cmd_list(config: &WaveConfig, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let waves = store.list_waves()?;

    if json {
        let rows: Vec<_> = waves
            .iter()
            .map(|w| {
                json!({
                    "wave_id": w.wave_id,
                    "strategy": w.strategy,
                    "status": w.status,
                    "complexity_score": w.complexity_score,
                    "file_count": w.file_count,
                    "iterations_run": w.iterations_run,
                    "start_time": w.start_time,
                    "duration_ms": duration_ms(w),
                })
            })
            .collect();
        return print_json(&rows);
    }

    println!();
    println!("{}", console::style("Waves").bold().cyan());
    println!();
    if waves.is_empty() {
        println!("  (none)");
    } else {
        println!(
            "  {:<34} {:<12} {:<12} {:>6} {:>6} {:>9}",
            "ID", "STRATEGY", "STATUS", "SCORE", "FILES", "DURATION"
        );
    }
    for wave in &waves {
        println!(
            "  {:<34} {:<12} {:<12} {:>6.3} {:>6} {:>9}",
            wave.wave_id,
            wave.strategy.as_str(),
            wave.status.as_str(),
            wave.complexity_score,
            wave.file_count,
            format_duration(wave)
        );
    }
    println!();
    Ok(())
}

pub fn cmd_status(config: &WaveConfig, json: bool, wave_id: &str) -> Result<()> {
    let store = open_store(config)?;
    let (record, outcome) = load_outcome(&store, wave_id)?;
    let executions = store.phase_executions(wave_id)?;

    if json {
        return print_json(&json!({
            "outcome": outcome,
            "duration_ms": duration_ms(&record),
            "phase_executions": executions,
        }));
    }

    print_outcome(&outcome);
    println!("  Duration:        {}", format_duration(&record));
    println!();
    if !executions.is_empty() {
        println!("  Phase executions:");
        for execution in &executions {
            let status = match execution.status {
                PhaseStatus::Succeeded => console::style(execution.status.as_str()).green(),
                PhaseStatus::Failed => console::style(execution.status.as_str()).red(),
                PhaseStatus::Skipped => console::style(execution.status.as_str()).dim(),
            };
            println!(
                "    {:<16} attempt {}  {:<9} {:>6}ms  [{}]",
                execution.phase.step_id(execution.iteration),
                execution.attempt,
                status,
                execution.duration.as_millis(),
                execution.execution_mode
            );
        }
        println!();
    }
    Ok(())
}

pub fn cmd_checkpoints(config: &WaveConfig, json: bool, wave_id: &str) -> Result<()> {
    let store = open_store(config)?;
    if store.get_wave(wave_id)?.is_none() {
        anyhow::bail!("Wave {} not found", wave_id);
    }
    let checkpoints = CheckpointStore::new(store).list(wave_id)?;

    if json {
        return print_json(&checkpoints);
    }

    println!();
    println!(
        "{} {}",
        console::style("Checkpoints for").bold().cyan(),
        console::style(wave_id).bold()
    );
    println!();
    if checkpoints.is_empty() {
        println!("  (none)");
    }
    for checkpoint in &checkpoints {
        let marker = if checkpoint.rollback_eligible {
            console::style("✓").green()
        } else {
            console::style("-").dim()
        };
        println!(
            "  {} #{:<3} {:<16} position {:<3} {} steps  {}",
            marker,
            checkpoint.sequence_number,
            checkpoint.phase.step_id(checkpoint.iteration),
            checkpoint.position,
            checkpoint.snapshot.record.phases_completed.len(),
            checkpoint.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!();
    Ok(())
}

pub fn cmd_rollback(config: &WaveConfig, json: bool, wave_id: &str) -> Result<()> {
    let store = open_store(config)?;
    if store.get_wave(wave_id)?.is_none() {
        anyhow::bail!("Wave {} not found", wave_id);
    }
    let checkpoint = CheckpointStore::new(store).latest_eligible(wave_id)?;

    if json {
        return print_json(&json!({
            "wave_id": wave_id,
            "sequence_number": checkpoint.as_ref().map(|c| c.sequence_number),
            "snapshot": checkpoint.as_ref().map(|c| &c.snapshot),
        }));
    }

    println!();
    match checkpoint {
        Some(checkpoint) => {
            println!(
                "{} #{} ({})",
                console::style("Rollback target").bold().cyan(),
                checkpoint.sequence_number,
                checkpoint.phase.step_id(checkpoint.iteration)
            );
            println!();
            let record = &checkpoint.snapshot.record;
            println!("  Status at snapshot: {}", record.status);
            println!("  Iterations run:     {}", record.iterations_run);
            println!("  Steps completed:");
            for step in &record.phases_completed {
                println!("    - {}", step);
            }
        }
        None => println!("No rollback-eligible checkpoint for wave {}", wave_id),
    }
    println!();
    Ok(())
}

/// Styled summary of a wave outcome.
pub(crate) fn print_outcome(outcome: &WaveOutcome) {
    let status = match outcome.status {
        WaveStatus::Completed => console::style(outcome.status.as_str()).green().bold(),
        WaveStatus::Partial | WaveStatus::Cancelled => {
            console::style(outcome.status.as_str()).yellow().bold()
        }
        WaveStatus::Failed => console::style(outcome.status.as_str()).red().bold(),
        WaveStatus::InProgress => console::style(outcome.status.as_str()).dim(),
    };

    println!();
    println!("  Wave:            {}", outcome.wave_id);
    println!("  Strategy:        {}", outcome.strategy);
    println!("  Status:          {}", status);
    println!("  Iterations run:  {}", outcome.iterations_run);
    println!("  Steps completed: {}", outcome.phases_completed.join(", "));
    match outcome.final_checkpoint {
        Some(seq) => println!("  Checkpoint:      #{}", seq),
        None => println!("  Checkpoint:      -"),
    }
    if !outcome.faults.is_empty() {
        println!("  Faults:");
        for fault in &outcome.faults {
            println!("    {} {}", console::style("⚠").yellow(), describe_fault(fault));
        }
    }
    println!();
}

fn describe_fault(fault: &WaveFault) -> String {
    match fault {
        WaveFault::Agent(fault) => fault.to_string(),
        WaveFault::PhaseFailure {
            phase,
            iteration,
            attempts,
        } => format!(
            "{} failed after {} attempts",
            phase.step_id(*iteration),
            attempts
        ),
        WaveFault::CheckpointWrite { phase, message } => {
            format!("checkpoint after {} rejected: {}", phase, message)
        }
        WaveFault::Persistence { message } => format!("persistence failure: {}", message),
        WaveFault::Cancelled { phase: Some(phase) } => format!("cancelled during {}", phase),
        WaveFault::Cancelled { phase: None } => "cancelled".to_string(),
    }
}
