//! The coordinator of a distributed synchronous rollout collection.
//!
//! A `DistributedSyncCollector` launches its workers, forms a process group
//! with them and gathers one batch from each of them per round.

pub mod configs;
mod coordinator;
pub mod error;
pub mod launcher;

use log::info;
use rollout::Factory;

pub use configs::{ClusterSpec, CollectorConfig, LauncherConfig, PerWorker, WeightSync};
pub use coordinator::{DistributedSyncCollector, Rounds};
pub use error::CollectorError;

/// Launches the workers described by `config` and returns the running collector.
///
/// # Errors
/// Returns a `CollectorError` if the config is invalid or the group can't be formed.
pub fn start(
    config: CollectorConfig,
    factory: &dyn Factory,
) -> Result<DistributedSyncCollector, CollectorError> {
    info!(
        "starting a collector with {} worker(s), {} frames per batch",
        config.envs.len(),
        config.frames_per_batch
    );
    DistributedSyncCollector::new(config, factory)
}
