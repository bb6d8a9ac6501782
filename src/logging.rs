//! Tracing subscriber setup for the `wave` binary.
//!
//! Console output goes to stderr so `--json` results on stdout stay clean.
//! The filter comes from `WAVE_LOG` (same syntax as `RUST_LOG`); without it
//! the level is `info`, or `debug` with `--verbose`.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "WAVE_LOG";

const LOG_FILE_PREFIX: &str = "wave.log";

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub verbose: bool,
    /// Emit console events as JSON lines.
    pub json: bool,
    /// Directory for the daily-rolling log file; `None` disables it.
    pub log_dir: Option<PathBuf>,
}

pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { "info" })
    })
}

/// Install the global subscriber.
///
/// Returns the file writer guard when a log directory is configured; keep
/// it alive for the life of the process or buffered lines are lost. A
/// subscriber that is already installed is left in place.
pub fn init(options: &LogOptions) -> Option<WorkerGuard> {
    let console = if options.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    let (file_layer, guard) = match &options.log_dir {
        Some(dir) => {
            if let Err(e) = std::fs::create_dir_all(dir) {
                eprintln!("Warning: cannot create log directory {}: {}", dir.display(), e);
                (None, None)
            } else {
                let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer().with_ansi(false).with_writer(writer);
                (Some(layer), Some(guard))
            }
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter(options.verbose))
        .with(console)
        .with(file_layer)
        .try_init();
    guard
}
