//! Wave execution (`wave run`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use wave_common::{Strategy, WaveStatus};
use wave_orchestrator::agents::AgentPool;
use wave_orchestrator::analyzer;
use wave_orchestrator::config::WaveConfig;
use wave_orchestrator::router::PhaseRouter;
use wave_orchestrator::scope::Scope;
use wave_orchestrator::store::SqliteStore;
use wave_orchestrator::strategy;
use wave_orchestrator::WaveOrchestrator;

use super::inspect::print_outcome;
use super::print_json;

/// Arguments of `wave run`.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub target: PathBuf,
    pub describe: Option<String>,
    pub strategy: Option<String>,
    pub wave_id: Option<String>,
    pub dry_run: bool,
}

pub async fn cmd_run(config: &WaveConfig, json: bool, args: RunArgs) -> Result<()> {
    let forced = args
        .strategy
        .as_deref()
        .map(str::parse::<Strategy>)
        .transpose()
        .map_err(|e| anyhow::anyhow!(e))?;

    let scope = Scope::scan(&args.target, args.describe.as_deref(), &config.toml.scope)?;
    let signal = analyzer::analyze(&scope, &config.toml.complexity);
    let context = strategy::context_for(signal, args.wave_id, forced);

    let settings = config.toml.orchestrator.clone();
    let pool = if args.dry_run {
        AgentPool::echo()
    } else {
        AgentPool::from_config(&config.toml.agents)?
    };
    if pool.kinds().is_empty() {
        eprintln!(
            "{} no agents configured in {}; every phase will fail (use --dry-run to test)",
            console::style("Warning:").yellow().bold(),
            config.config_file().display()
        );
    }
    let router = PhaseRouter::new(pool, settings.agent_timeout());

    config.ensure_directories()?;
    let db_path = config.db_path();
    let store = SqliteStore::new(&db_path)
        .with_context(|| format!("Failed to open wave database {}", db_path.display()))?;
    let orchestrator = WaveOrchestrator::new(Arc::new(store), router, settings)
        .with_weights(config.toml.complexity.clone());

    if !json {
        println!();
        println!(
            "{} {} ({} strategy, {} files, score {:.3})",
            console::style("Running wave").bold().cyan(),
            console::style(&context.wave_id).bold(),
            context.strategy,
            context.file_count,
            context.complexity_score
        );
    }

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling wave");
                cancel.cancel();
            }
        })
    };

    let outcome = orchestrator
        .execute_wave_cancellable(context, Some(scope), cancel)
        .await;
    ctrl_c.abort();
    let outcome = outcome?;

    if json {
        print_json(&outcome)?;
    } else {
        print_outcome(&outcome);
    }

    match outcome.status {
        WaveStatus::Completed => Ok(()),
        status => anyhow::bail!("Wave {} finished {}", outcome.wave_id, status),
    }
}
