//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module          | Commands handled                                   |
//! |-----------------|-----------------------------------------------------|
//! | `analyze`       | `Analyze`                                          |
//! | `run`           | `Run`                                              |
//! | `inspect`       | `List`, `Status`, `Checkpoints`, `Rollback`        |
//! | `config`        | `Config`                                           |

pub mod analyze;
pub mod config;
pub mod inspect;
pub mod run;

pub use analyze::cmd_analyze;
pub use config::cmd_config;
pub use inspect::{cmd_checkpoints, cmd_list, cmd_rollback, cmd_status};
pub use run::{RunArgs, cmd_run};

use anyhow::Result;
use serde::Serialize;

/// Print a value as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
