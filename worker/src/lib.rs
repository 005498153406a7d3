pub mod builder;
pub mod config;
pub mod error;
mod metrics;
#[cfg(feature = "frame-trace")]
mod trace;
pub mod worker;

use std::time::Duration;

use comms::specs::worker::WorkerSpec;
use log::info;
use rollout::Factory;

pub use builder::WorkerBuilder;
pub use config::WorkerConfig;
pub use error::{Result, WorkerErr};
pub use metrics::WorkerReport;
pub use worker::Worker;

/// Builds a worker from its bootstrap spec, joins the coordinator's group and
/// runs it to completion.
///
/// # Args
/// * `spec` - Bootstrap specification handed over by the launcher.
/// * `factory` - Resolves the environment and policy specs.
///
/// # Errors
/// Returns `WorkerErr` if the spec is invalid, the group can't be joined
/// within the connect timeout or the run fails.
pub async fn run(spec: &WorkerSpec, factory: &dyn Factory) -> Result<WorkerReport> {
    let worker = WorkerBuilder::build(spec, factory)?;

    info!(
        rank = spec.rank;
        "joining {} over {} as worker {} of {}",
        spec.addr, spec.backend, spec.rank, spec.world_size.saturating_sub(1)
    );

    let timeout = Duration::from_secs(spec.connect_timeout_secs);
    let (peer, world_size) =
        comms::group::join(spec.backend, &spec.addr, spec.rank, timeout).await?;

    if world_size != spec.world_size {
        return Err(WorkerErr::InvalidConfig(format!(
            "joined a group of {world_size}, expected {}",
            spec.world_size
        )));
    }

    let (rx, tx) = peer.into_parts();
    worker.run(rx, tx).await
}
