mod frames;
mod multi_async;
mod multi_sync;
mod single;

pub use multi_async::AsyncCollector;
pub use multi_sync::SyncCollector;
pub use single::SingleCollector;

use comms::specs::{
    rollout::{EnvSpec, PolicySpec},
    worker::CollectorKind,
};
use log::debug;
use serde::Deserialize;

use crate::{Batch, Factory, ParamMap, Result, RolloutErr};

/// Extra per-worker configuration of a local collector.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectorOptions {
    /// Seed of the first episode of the first sub-environment.
    pub seed: u64,
    /// Start a fresh episode at the beginning of every batch.
    pub reset_at_each_batch: bool,
}

/// Everything needed to build a `LocalCollector`.
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub kind: CollectorKind,
    pub num_envs: usize,
    pub env: EnvSpec,
    pub policy: PolicySpec,
    pub frames_per_batch: usize,
    pub total_frames: usize,
    pub options: CollectorOptions,
    pub share_policy: bool,
    /// Produce nothing until parameters are loaded, when the policy has any.
    pub await_params: bool,
}

impl CollectorSettings {
    /// Checks the settings are coherent with each other.
    pub fn validate(&self) -> Result<()> {
        if self.num_envs == 0 {
            return Err(RolloutErr::InvalidConfig(
                "a collector needs at least one environment".into(),
            ));
        }

        if self.frames_per_batch == 0 {
            return Err(RolloutErr::InvalidConfig(
                "frames_per_batch must be positive".into(),
            ));
        }

        match self.kind {
            CollectorKind::Single if self.num_envs != 1 => Err(RolloutErr::InvalidConfig(format!(
                "a single collector drives exactly one environment, got {}",
                self.num_envs
            ))),
            CollectorKind::Sync if self.frames_per_batch % self.num_envs != 0 => {
                Err(RolloutErr::InvalidConfig(format!(
                    "{} frames per batch can't be split evenly across {} environments",
                    self.frames_per_batch, self.num_envs
                )))
            }
            _ => Ok(()),
        }
    }
}

/// The local data collector a worker drives.
pub enum LocalCollector {
    Single(SingleCollector),
    MultiSync(SyncCollector),
    MultiAsync(AsyncCollector),
}

impl LocalCollector {
    /// Builds the environments, the policy and the collector of the requested kind.
    ///
    /// # Arguments
    /// * `factory` - Resolves the environment and policy specs.
    /// * `settings` - What to build.
    ///
    /// # Errors
    /// `RolloutErr` if the settings are invalid or a spec can't be resolved.
    pub fn build(factory: &dyn Factory, settings: &CollectorSettings) -> Result<Self> {
        settings.validate()?;

        let envs = (0..settings.num_envs)
            .map(|_| factory.make_env(&settings.env))
            .collect::<Result<Vec<_>>>()?;

        let (observation_size, action_size) = (envs[0].observation_size(), envs[0].action_size());
        let policy = factory.make_policy(&settings.policy, observation_size, action_size)?;

        debug!(
            "built local collector: kind={} envs={} env={}",
            settings.kind, settings.num_envs, settings.env.kind
        );

        let CollectorSettings {
            frames_per_batch,
            total_frames,
            ref options,
            ..
        } = *settings;

        let collector = match settings.kind {
            CollectorKind::Single => {
                let env = envs.into_iter().next().ok_or_else(|| {
                    RolloutErr::InvalidConfig("no environment was built".into())
                })?;

                Self::Single(SingleCollector::new(
                    env,
                    policy,
                    frames_per_batch,
                    total_frames,
                    options,
                ))
            }
            CollectorKind::Sync => Self::MultiSync(SyncCollector::new(
                envs,
                policy,
                frames_per_batch,
                total_frames,
                options,
            )),
            CollectorKind::Async => Self::MultiAsync(AsyncCollector::new(
                envs,
                policy,
                frames_per_batch,
                total_frames,
                options,
                settings.share_policy,
                settings.await_params,
            )),
        };

        Ok(collector)
    }

    /// Produces the next batch.
    ///
    /// # Returns
    /// `None` once `total_frames` were yielded.
    pub fn next_batch(&mut self) -> Option<Result<Batch>> {
        match self {
            Self::Single(c) => c.next_batch(),
            Self::MultiSync(c) => c.next_batch(),
            Self::MultiAsync(c) => c.next_batch(),
        }
    }

    /// A copy of the acting policy's parameters.
    pub fn params(&self) -> ParamMap {
        match self {
            Self::Single(c) => c.params(),
            Self::MultiSync(c) => c.params(),
            Self::MultiAsync(c) => c.params(),
        }
    }

    /// Loads new policy parameters from their flat representation.
    pub fn load_flat(&mut self, flat: &[f32]) -> Result<()> {
        match self {
            Self::Single(c) => c.load_flat(flat),
            Self::MultiSync(c) => c.load_flat(flat),
            Self::MultiAsync(c) => c.load_flat(flat),
        }
    }

    /// Loads new policy parameters, they must match the acting policy's layout.
    pub fn load_params(&mut self, params: &ParamMap) -> Result<()> {
        self.load_flat(&params.flatten())
    }

    pub fn shutdown(&mut self) {
        match self {
            Self::Single(c) => c.shutdown(),
            Self::MultiSync(c) => c.shutdown(),
            Self::MultiAsync(c) => c.shutdown(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Self::Single(c) => c.is_closed(),
            Self::MultiSync(c) => c.is_closed(),
            Self::MultiAsync(c) => c.is_closed(),
        }
    }

    /// Frames yielded so far.
    pub fn frames(&self) -> usize {
        match self {
            Self::Single(c) => c.frames(),
            Self::MultiSync(c) => c.frames(),
            Self::MultiAsync(c) => c.frames(),
        }
    }
}

/// The first episode seed of the `i`-th sub-environment.
fn slot_seed(seed: u64, i: usize) -> u64 {
    seed.wrapping_add((i as u64) << 32)
}
