pub mod agents;
pub mod analyzer;
pub mod checkpoint;
pub mod config;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod router;
pub mod scope;
pub mod store;
pub mod strategy;

#[cfg(test)]
mod testing;

pub use errors::{StoreError, WaveError};
pub use orchestrator::WaveOrchestrator;
