use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use wave_orchestrator::config::WaveConfig;
use wave_orchestrator::logging::{self, LogOptions};

mod cmd;

#[derive(Parser)]
#[command(name = "wave")]
#[command(version, about = "Multi-phase wave orchestrator for worker agents")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Print machine-readable JSON instead of styled text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a target and show the strategy it would run with
    Analyze {
        /// File or directory to analyze
        target: PathBuf,

        /// Free-text task description used for tag detection
        #[arg(short, long)]
        describe: Option<String>,
    },
    /// Execute a wave over a target
    Run {
        /// File or directory the wave works on
        target: PathBuf,

        #[arg(short, long)]
        describe: Option<String>,

        /// Force a strategy instead of selecting one
        #[arg(long)]
        strategy: Option<String>,

        /// Wave identifier (generated when omitted)
        #[arg(long)]
        wave_id: Option<String>,

        /// Use echo agents instead of the configured agent programs
        #[arg(long)]
        dry_run: bool,
    },
    /// List stored waves
    List,
    /// Show the outcome of a wave
    Status { wave_id: String },
    /// List checkpoints of a wave
    Checkpoints { wave_id: String },
    /// Show the snapshot a wave would roll back to
    Rollback { wave_id: String },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate wave.toml and report warnings
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = WaveConfig::with_cli_args(project_dir, cli.verbose)?;
    let log_dir = config.toml.logging.file.then(|| config.log_dir());
    let _log_guard = logging::init(&LogOptions {
        verbose: cli.verbose,
        json: config.toml.logging.json,
        log_dir: if matches!(cli.command, Commands::Run { .. }) {
            log_dir
        } else {
            None
        },
    });

    let json = cli.json;
    match &cli.command {
        Commands::Analyze { target, describe } => {
            cmd::cmd_analyze(&config, json, target, describe.as_deref())?
        }
        Commands::Run {
            target,
            describe,
            strategy,
            wave_id,
            dry_run,
        } => {
            cmd::cmd_run(
                &config,
                json,
                cmd::RunArgs {
                    target: target.clone(),
                    describe: describe.clone(),
                    strategy: strategy.clone(),
                    wave_id: wave_id.clone(),
                    dry_run: *dry_run,
                },
            )
            .await?
        }
        Commands::List => cmd::cmd_list(&config, json)?,
        Commands::Status { wave_id } => cmd::cmd_status(&config, json, wave_id)?,
        Commands::Checkpoints { wave_id } => cmd::cmd_checkpoints(&config, json, wave_id)?,
        Commands::Rollback { wave_id } => cmd::cmd_rollback(&config, json, wave_id)?,
        Commands::Config { command } => cmd::cmd_config(&config, json, command.clone())?,
    }

    Ok(())
}
