use std::{num::NonZeroUsize, path::PathBuf, time::Duration};

use comms::specs::{
    rollout::{EnvSpec, PolicySpec},
    worker::{Backend, CollectorKind},
};

use super::LauncherConfig;

/// How long workers get to join the group, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 1000;

/// A value given once for every worker, or once per worker.
#[derive(Debug, Clone)]
pub enum PerWorker<T> {
    Shared(T),
    Each(Vec<T>),
}

impl<T: Default> Default for PerWorker<T> {
    fn default() -> Self {
        Self::Shared(T::default())
    }
}

/// When the coordinator pushes the policy weights to its workers.
#[derive(Debug, Clone, Copy)]
pub struct WeightSync {
    /// Rounds between two broadcasts.
    pub update_interval: usize,
    /// Broadcast before every round, overriding the interval.
    pub update_after_each_batch: bool,
    /// Upper bound on how many rounds a worker may act with stale weights.
    pub max_weight_update_interval: Option<NonZeroUsize>,
}

impl Default for WeightSync {
    fn default() -> Self {
        Self {
            update_interval: 1,
            update_after_each_batch: false,
            max_weight_update_interval: None,
        }
    }
}

impl WeightSync {
    /// The interval actually used by both the coordinator and the workers.
    pub fn effective_interval(&self) -> usize {
        if self.update_after_each_batch {
            return 1;
        }

        match self.max_weight_update_interval {
            Some(max) => self.update_interval.min(max.get()),
            None => self.update_interval,
        }
    }
}

/// The distributed collector's configuration.
#[derive(Debug)]
pub struct CollectorConfig {
    /// One environment spec per worker, its length is the number of workers.
    pub envs: Vec<EnvSpec>,
    pub policy: PolicySpec,
    /// Frames gathered in every round across all workers.
    pub frames_per_batch: usize,
    /// Frames gathered over the whole run.
    pub total_frames: usize,
    pub kind: CollectorKind,
    pub num_envs_per_worker: usize,
    /// Extra local collector options, see `rollout::CollectorOptions`.
    pub options: PerWorker<serde_json::Value>,
    pub launcher: LauncherConfig,
    pub backend: Backend,
    /// The address advertised to the workers, resolved from the launcher when unset.
    pub host: Option<String>,
    /// Falls back to the `TCP_PORT` environment variable, then to 10003.
    pub port: Option<u16>,
    /// The socket file of the unix backend, a temporary path when unset.
    pub socket_path: Option<PathBuf>,
    pub weight_sync: WeightSync,
    pub connect_timeout: Duration,
    /// Upper bound for every round, unbounded when unset.
    pub round_timeout: Option<Duration>,
    /// How long workers get to exit on their own at shutdown.
    pub shutdown_grace: Duration,
    /// Whether the sub-collectors of an async worker act with one policy instance.
    pub share_policy: bool,
}

impl CollectorConfig {
    /// Creates a new `CollectorConfig` with every optional setting at its default.
    ///
    /// # Arguments
    /// * `envs` - One environment spec per worker.
    /// * `policy` - The acting policy.
    /// * `frames_per_batch` - Frames per round across all workers.
    /// * `total_frames` - Frames over the whole run.
    /// * `launcher` - How workers are started.
    pub fn new(
        envs: Vec<EnvSpec>,
        policy: PolicySpec,
        frames_per_batch: usize,
        total_frames: usize,
        launcher: LauncherConfig,
    ) -> Self {
        Self {
            envs,
            policy,
            frames_per_batch,
            total_frames,
            kind: CollectorKind::Single,
            num_envs_per_worker: 1,
            options: PerWorker::default(),
            launcher,
            backend: Backend::Tcp,
            host: None,
            port: None,
            socket_path: None,
            weight_sync: WeightSync::default(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            round_timeout: None,
            shutdown_grace: Duration::from_secs(10),
            share_policy: false,
        }
    }
}
