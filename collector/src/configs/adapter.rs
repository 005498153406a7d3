use comms::specs::worker::{Backend, CollectorKind, WorkerSpec};
use rollout::{CollectorOptions, CollectorSettings, parse_params};

use super::{CollectorConfig, LauncherConfig, PerWorker};
use crate::error::CollectorError;

pub(crate) const DEFAULT_PORT: u16 = 10003;

/// The quantities derived from a validated config.
#[derive(Debug, Clone)]
pub(crate) struct Plan {
    pub num_workers: usize,
    pub frames_per_worker: usize,
    pub total_frames_per_worker: usize,
    pub rounds: usize,
    pub update_interval: usize,
    /// Raw local collector options, one per worker.
    pub options: Vec<serde_json::Value>,
}

pub(crate) struct Adapter;

impl Adapter {
    /// Validates `config` and derives the per-worker quantities.
    ///
    /// # Errors
    /// `CollectorError::InvalidConfig` describing the first violated constraint.
    pub fn plan(config: &CollectorConfig) -> Result<Plan, CollectorError> {
        let num_workers = config.envs.len();
        if num_workers == 0 {
            return invalid("at least one worker environment is required".into());
        }

        if config.frames_per_batch == 0 {
            return invalid("frames_per_batch must be greater than 0".into());
        }

        if config.total_frames % num_workers != 0 {
            return invalid(format!(
                "total_frames ({}) must be divisible by the number of workers ({num_workers})",
                config.total_frames
            ));
        }

        if config.frames_per_batch % num_workers != 0 {
            return invalid(format!(
                "frames_per_batch ({}) must be divisible by the number of workers ({num_workers})",
                config.frames_per_batch
            ));
        }

        if config.total_frames % config.frames_per_batch != 0 {
            return invalid(format!(
                "total_frames ({}) must be a multiple of frames_per_batch ({})",
                config.total_frames, config.frames_per_batch
            ));
        }

        let frames_per_worker = config.frames_per_batch / num_workers;
        let envs = config.num_envs_per_worker;

        match config.kind {
            CollectorKind::Single if envs != 1 => {
                return invalid(format!(
                    "a single collector drives exactly one environment, got {envs}"
                ));
            }
            CollectorKind::Sync | CollectorKind::Async if envs == 0 => {
                return invalid("num_envs_per_worker must be greater than 0".into());
            }
            CollectorKind::Sync if frames_per_worker % envs != 0 => {
                return invalid(format!(
                    "{frames_per_worker} frames per worker can't be split across {envs} environments"
                ));
            }
            _ => {}
        }

        let update_interval = config.weight_sync.effective_interval();
        if update_interval == 0 {
            return invalid("update_interval must be greater than 0".into());
        }

        if config.backend == Backend::Unix
            && matches!(config.launcher, LauncherConfig::ClusterJob { .. })
        {
            return invalid("the unix backend can't reach cluster jobs on other hosts".into());
        }

        let options = match &config.options {
            PerWorker::Shared(value) => vec![value.clone(); num_workers],
            PerWorker::Each(values) if values.len() == num_workers => values.clone(),
            PerWorker::Each(values) => {
                return invalid(format!(
                    "got {} collector option sets for {num_workers} workers",
                    values.len()
                ));
            }
        };

        for (i, value) in options.iter().enumerate() {
            parse_params::<CollectorOptions>(value).map_err(|e| {
                CollectorError::InvalidConfig(format!("collector options of worker {}: {e}", i + 1))
            })?;
        }

        Ok(Plan {
            num_workers,
            frames_per_worker,
            total_frames_per_worker: config.total_frames / num_workers,
            rounds: config.total_frames / config.frames_per_batch,
            update_interval,
            options,
        })
    }

    /// The bootstrap spec of worker `rank`, ranks start at 1.
    pub fn worker_spec(config: &CollectorConfig, plan: &Plan, rank: usize, addr: &str) -> WorkerSpec {
        WorkerSpec {
            rank,
            world_size: plan.num_workers + 1,
            addr: addr.to_string(),
            backend: config.backend,
            kind: config.kind,
            num_envs: config.num_envs_per_worker,
            env: config.envs[rank - 1].clone(),
            policy: config.policy.clone(),
            frames_per_batch: plan.frames_per_worker,
            total_frames: plan.total_frames_per_worker,
            update_interval: plan.update_interval,
            options: plan.options[rank - 1].clone(),
            connect_timeout_secs: config.connect_timeout.as_secs().max(1),
            share_policy: config.share_policy,
        }
    }

    /// Settings of the throwaway local collector that sizes the output buffer.
    pub fn probe_settings(
        config: &CollectorConfig,
        plan: &Plan,
    ) -> Result<CollectorSettings, CollectorError> {
        Ok(CollectorSettings {
            kind: config.kind,
            num_envs: config.num_envs_per_worker,
            env: config.envs[0].clone(),
            policy: config.policy.clone(),
            frames_per_batch: plan.frames_per_worker,
            total_frames: plan.frames_per_worker,
            options: parse_params(&plan.options[0])?,
            share_policy: config.share_policy,
            await_params: false,
        })
    }
}

/// Picks the explicit port, else the `TCP_PORT` value, else the default.
pub(crate) fn resolve_port(explicit: Option<u16>, from_env: Option<String>) -> Result<u16, CollectorError> {
    if let Some(port) = explicit {
        return Ok(port);
    }

    match from_env {
        Some(value) => value.trim().parse().map_err(|_| {
            CollectorError::InvalidConfig(format!("TCP_PORT is not a valid port: {value:?}"))
        }),
        None => Ok(DEFAULT_PORT),
    }
}

fn invalid<T>(msg: String) -> Result<T, CollectorError> {
    Err(CollectorError::InvalidConfig(msg))
}
