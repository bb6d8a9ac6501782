//! Configuration view and validation commands (`wave config`).

use anyhow::Result;
use serde_json::json;

use wave_orchestrator::config::WaveConfig;

use super::super::ConfigCommands;
use super::print_json;

pub fn cmd_config(config: &WaveConfig, json: bool, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            if json {
                return print_json(&json!({
                    "config_file": config_path.exists().then(|| config_path.display().to_string()),
                    "db_path": config.db_path().display().to_string(),
                    "config": config.toml,
                }));
            }

            println!();
            println!("Wave Configuration");
            println!("==================");
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No wave.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!("Database:    {}", config.db_path().display());
            println!();
            println!("Effective values (with env overrides):");
            println!();
            print!("{}", toml::to_string_pretty(&config.toml)?);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            let warnings = config.validate();

            if json {
                return print_json(&json!({
                    "valid": warnings.is_empty(),
                    "warnings": warnings,
                }));
            }

            println!();
            println!("Validating configuration...");
            println!();
            if !config_path.exists() {
                println!("No wave.toml found. Using defaults.");
            }
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
    }

    Ok(())
}
