use comms::specs::worker::{CollectorKind, WorkerSpec};
use rollout::{CollectorOptions, CollectorSettings, Factory, LocalCollector, parse_params};

use crate::{Result, Worker, WorkerConfig, WorkerErr};

pub struct WorkerBuilder;

impl WorkerBuilder {
    /// Builds a `Worker` from a `WorkerSpec`.
    ///
    /// # Args
    /// * `spec` - Bootstrap specification received from the coordinator.
    /// * `factory` - Resolves the environment and policy specs.
    ///
    /// # Returns
    /// A fully initialized `Worker` instance.
    ///
    /// # Errors
    /// `WorkerErr::InvalidConfig` if the spec is incoherent, `WorkerErr::Rollout`
    /// if the local collector can't be built.
    pub fn build(spec: &WorkerSpec, factory: &dyn Factory) -> Result<Worker> {
        if spec.kind == CollectorKind::Single && spec.num_envs != 1 {
            return Err(WorkerErr::InvalidConfig(format!(
                "a single collector drives exactly one environment, got {}",
                spec.num_envs
            )));
        }

        let config = WorkerConfig::from_spec(spec)?;

        let mut options: CollectorOptions = parse_params(&spec.options)?;
        // Keep episodes of different ranks apart when they share their options.
        options.seed = options.seed.wrapping_add((spec.rank as u64) << 48);

        let settings = CollectorSettings {
            kind: spec.kind,
            num_envs: spec.num_envs,
            env: spec.env.clone(),
            policy: spec.policy.clone(),
            frames_per_batch: spec.frames_per_batch,
            total_frames: spec.total_frames,
            options,
            share_policy: spec.share_policy,
            await_params: true,
        };

        let collector = LocalCollector::build(factory, &settings)?;
        Ok(Worker::new(config, collector))
    }
}
