use std::{
    env,
    net::{SocketAddr, UdpSocket},
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, Instant},
};

use comms::{
    GroupListener, ProcessGroup,
    specs::{rollout::EnvSpec, worker::Backend},
    wait_all,
};
use log::{debug, info, warn};
use rollout::{Batch, Factory, LocalCollector, RolloutErr, SharedParams};
use tokio::runtime::Runtime;

use crate::{
    configs::{Adapter, CollectorConfig, LauncherConfig, Plan, resolve_port},
    error::CollectorError,
    launcher::{ClusterLauncher, Launcher, ProcessLauncher, WorkerHandle},
};

/// Tells apart the default socket paths of collectors in the same process.
static SOCKET_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// The address probed to find the interface cluster jobs can reach us on.
const OUTBOUND_PROBE: &str = "8.8.8.8:80";

/// A launched worker, as tracked by the coordinator.
struct WorkerSlot {
    rank: usize,
    env: EnvSpec,
    handle: Box<dyn WorkerHandle>,
    staleness: usize,
}

#[derive(Debug, Default)]
struct RunState {
    frames: usize,
    round: usize,
    done: bool,
}

/// Collects rollouts from a group of remote workers in lockstep.
///
/// Every round the policy weights are broadcast when due, then one batch is
/// gathered from every worker straight into a stacked buffer of shape
/// `[num_workers, frames_per_worker]`, and a copy of it is yielded.
pub struct DistributedSyncCollector {
    runtime: Runtime,
    group: Option<ProcessGroup>,
    workers: Vec<WorkerSlot>,
    buffer: Option<Batch>,
    params: SharedParams,
    flat: Vec<f32>,
    plan: Plan,
    state: RunState,
    round_timeout: Option<Duration>,
    shutdown_grace: Duration,
    local_addr: String,
    closed: bool,
}

impl DistributedSyncCollector {
    /// Creates a new `DistributedSyncCollector`, launching every worker and
    /// waiting for all of them to join.
    ///
    /// # Arguments
    /// * `config` - The collector's configuration.
    /// * `factory` - Resolves the env and policy specs for the shape probe.
    ///
    /// # Errors
    /// `CollectorError` if the config is invalid, a worker can't be launched or
    /// the group can't be established. Workers launched before the failure are
    /// terminated.
    pub fn new(config: CollectorConfig, factory: &dyn Factory) -> Result<Self, CollectorError> {
        let plan = Adapter::plan(&config)?;
        let (bind_addr, host) = resolve_addr(&config)?;

        let (mut buffer, params) = shape_probe(&config, &plan, factory)?;
        buffer.lock();

        let runtime = Runtime::new()?;
        let listener = runtime
            .block_on(GroupListener::bind(config.backend, &bind_addr))
            .map_err(|source| CollectorError::Connection {
                addr: bind_addr.clone(),
                source,
            })?;

        let local_addr = match config.backend {
            Backend::Tcp => {
                let bound: SocketAddr = listener
                    .local_addr()?
                    .parse()
                    .map_err(std::io::Error::other)?;
                format!("{host}:{}", bound.port())
            }
            Backend::Unix => listener.local_addr()?,
        };

        let specs: Vec<_> = (1..=plan.num_workers)
            .map(|rank| Adapter::worker_spec(&config, &plan, rank, &local_addr))
            .collect();

        let connect_timeout = config.connect_timeout;
        let round_timeout = config.round_timeout;
        let shutdown_grace = config.shutdown_grace;
        let mut launcher = into_launcher(config.launcher)?;

        info!(
            "launching {} workers, group on {local_addr} over {}",
            plan.num_workers, config.backend
        );

        let mut workers: Vec<WorkerSlot> = Vec::with_capacity(plan.num_workers);
        for spec in specs {
            match launcher.launch(&spec) {
                Ok(handle) => workers.push(WorkerSlot {
                    rank: spec.rank,
                    env: spec.env,
                    handle,
                    staleness: 0,
                }),
                Err(source) => {
                    terminate_all(&mut workers);
                    return Err(CollectorError::Launch {
                        rank: spec.rank,
                        source,
                    });
                }
            }
        }

        let ready_by = Instant::now() + connect_timeout;
        for i in 0..workers.len() {
            let left = ready_by.saturating_duration_since(Instant::now());
            if let Err(source) = workers[i].handle.wait_until_ready(left) {
                let rank = workers[i].rank;
                terminate_all(&mut workers);
                return Err(CollectorError::Launch { rank, source });
            }
        }

        let world_size = plan.num_workers + 1;
        let left = ready_by.saturating_duration_since(Instant::now());
        let group = match runtime.block_on(listener.accept_all(world_size, left)) {
            Ok(group) => group,
            Err(source) => {
                terminate_all(&mut workers);
                return Err(CollectorError::Connection {
                    addr: local_addr,
                    source,
                });
            }
        };

        info!(
            "collecting {} frames in {} rounds of {} frames per worker",
            plan.total_frames_per_worker * plan.num_workers,
            plan.rounds,
            plan.frames_per_worker
        );

        Ok(Self {
            runtime,
            group: Some(group),
            workers,
            buffer: Some(buffer),
            params,
            flat: Vec::new(),
            plan,
            state: RunState::default(),
            round_timeout,
            shutdown_grace,
            local_addr,
            closed: false,
        })
    }

    /// The lazy sequence of gathered batches.
    ///
    /// It yields exactly `rounds()` batches and is fused after the last one or
    /// after the first error. It can't be restarted.
    pub fn iter(&mut self) -> Rounds<'_> {
        Rounds { collector: self }
    }

    /// Runs one round: broadcast when due, then gather from every worker.
    fn round(&mut self) -> Result<Batch, CollectorError> {
        let round = self.state.round;
        let due = round % self.plan.update_interval == 0 && !self.params.is_empty();

        if due {
            self.params.snapshot_flat(&mut self.flat);
        }

        let (Some(group), Some(buffer)) = (self.group.as_mut(), self.buffer.as_mut()) else {
            return Err(shut_down());
        };

        let flat = &self.flat;
        let exchange = async move {
            if due {
                wait_all(group.isend_params(flat))
                    .await
                    .map_err(|(rank, source)| CollectorError::Broadcast { rank, source })?;
            }

            wait_all(group.irecv_fields(buffer.worker_slices_mut()))
                .await
                .map_err(|(rank, source)| CollectorError::Gather { rank, source })
        };

        match self.round_timeout {
            Some(limit) => self
                .runtime
                .block_on(async { tokio::time::timeout(limit, exchange).await })
                .map_err(|_| CollectorError::RoundTimeout { round })??,
            None => self.runtime.block_on(exchange)?,
        }

        for worker in &mut self.workers {
            if due {
                worker.staleness = 0;
            } else {
                worker.staleness += 1;
            }
        }

        let buffer = self.buffer.as_ref().ok_or_else(shut_down)?;
        let batch = buffer.snapshot();
        self.state.frames += batch.numel();
        self.state.round += 1;

        debug!(
            "round {round} done: weights_sent={due} frames={}",
            self.state.frames
        );
        Ok(batch)
    }

    /// Weights are pushed on the update schedule from `params()`, never on demand.
    pub fn update_policy_weights_(&mut self) -> Result<(), CollectorError> {
        Err(CollectorError::Unsupported {
            operation: "update_policy_weights_",
        })
    }

    pub fn set_seed(&mut self, seed: u64) -> Result<(), CollectorError> {
        let _ = seed;
        Err(CollectorError::Unsupported {
            operation: "set_seed",
        })
    }

    pub fn state_dict(&self) -> Result<serde_json::Value, CollectorError> {
        Err(CollectorError::Unsupported {
            operation: "state_dict",
        })
    }

    pub fn load_state_dict(&mut self, state: &serde_json::Value) -> Result<(), CollectorError> {
        let _ = state;
        Err(CollectorError::Unsupported {
            operation: "load_state_dict",
        })
    }

    /// Stops every worker and releases the group and the output buffer.
    ///
    /// Workers get `shutdown_grace` to exit on their own before they are
    /// terminated. Calling it again is a no-op.
    pub fn shutdown(&mut self) -> Result<(), CollectorError> {
        if self.closed {
            return Ok(());
        }

        self.closed = true;
        self.state.done = true;

        if let Some(mut group) = self.group.take() {
            self.runtime.block_on(group.stop());
        }

        let deadline = Instant::now() + self.shutdown_grace;
        for worker in &mut self.workers {
            let left = deadline.saturating_duration_since(Instant::now());
            match worker.handle.wait(left) {
                Ok(true) => continue,
                Ok(false) => warn!(
                    "worker {} ({}) did not exit within the grace period",
                    worker.rank, worker.env.kind
                ),
                Err(e) => warn!("could not wait for worker {}: {e}", worker.rank),
            }

            if let Err(e) = worker.handle.terminate() {
                warn!("could not terminate worker {}: {e}", worker.rank);
            }
        }

        self.buffer = None;
        info!(
            "collector shut down after {} rounds and {} frames",
            self.state.round, self.state.frames
        );
        Ok(())
    }

    pub fn num_workers(&self) -> usize {
        self.plan.num_workers
    }

    pub fn frames_per_worker(&self) -> usize {
        self.plan.frames_per_worker
    }

    pub fn total_frames(&self) -> usize {
        self.plan.total_frames_per_worker * self.plan.num_workers
    }

    /// Frames yielded so far.
    pub fn frames_collected(&self) -> usize {
        self.state.frames
    }

    pub fn rounds(&self) -> usize {
        self.plan.rounds
    }

    /// The effective weight update interval, in rounds.
    pub fn update_interval(&self) -> usize {
        self.plan.update_interval
    }

    /// Rounds since each worker last received weights, in rank order.
    pub fn staleness(&self) -> Vec<usize> {
        self.workers.iter().map(|w| w.staleness).collect()
    }

    /// The handle the training loop writes new policy weights through.
    pub fn params(&self) -> SharedParams {
        self.params.clone()
    }

    /// Whether each worker is still running, in rank order.
    pub fn workers_alive(&mut self) -> Vec<bool> {
        self.workers.iter_mut().map(|w| w.handle.is_alive()).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The address the workers joined on.
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }
}

impl Drop for DistributedSyncCollector {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("shutdown on drop failed: {e}");
        }
    }
}

/// Iterator over the rounds of a `DistributedSyncCollector`.
pub struct Rounds<'a> {
    collector: &'a mut DistributedSyncCollector,
}

impl Iterator for Rounds<'_> {
    type Item = Result<Batch, CollectorError>;

    fn next(&mut self) -> Option<Self::Item> {
        let collector = &mut *self.collector;
        if collector.state.done || collector.state.round >= collector.plan.rounds {
            collector.state.done = true;
            return None;
        }

        let result = collector.round();
        if let Err(e) = &result {
            warn!("round {} failed: {e}", collector.state.round);
            collector.state.done = true;
        }

        Some(result)
    }
}

/// Runs one local batch to learn the field shapes and the policy parameters.
fn shape_probe(
    config: &CollectorConfig,
    plan: &Plan,
    factory: &dyn Factory,
) -> Result<(Batch, SharedParams), CollectorError> {
    let settings = Adapter::probe_settings(config, plan)?;
    let mut probe = LocalCollector::build(factory, &settings)?;

    let sample = match probe.next_batch() {
        Some(batch) => batch,
        None => Err(RolloutErr::Closed),
    };
    let params = SharedParams::new(probe.params());
    probe.shutdown();

    let sample = sample?;
    debug!(
        "shape probe: fields={:?} batch_size={:?} params={}",
        sample.field_names(),
        sample.batch_size(),
        params.read().numel()
    );

    Ok((sample.stacked(plan.num_workers), params))
}

/// The address to bind and the host advertised to the workers.
fn resolve_addr(config: &CollectorConfig) -> Result<(String, String), CollectorError> {
    if config.backend == Backend::Unix {
        let path = match &config.socket_path {
            Some(path) => path.clone(),
            None => default_socket_path(),
        };

        let path = path.display().to_string();
        return Ok((path.clone(), path));
    }

    let port = resolve_port(config.port, env::var("TCP_PORT").ok())?;
    let cluster = matches!(config.launcher, LauncherConfig::ClusterJob { .. });

    match (&config.host, cluster) {
        (Some(host), _) => Ok((format!("{host}:{port}"), host.clone())),
        (None, true) => Ok((format!("0.0.0.0:{port}"), outbound_ip()?)),
        (None, false) => Ok((format!("127.0.0.1:{port}"), "127.0.0.1".into())),
    }
}

fn default_socket_path() -> PathBuf {
    let n = SOCKET_COUNTER.fetch_add(1, Ordering::Relaxed);
    env::temp_dir().join(format!("rollout-collector-{}-{n}.sock", std::process::id()))
}

/// The local address of the interface that routes outside of this host.
fn outbound_ip() -> Result<String, CollectorError> {
    // Connecting a udp socket sends nothing, it only picks the route.
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket
        .connect(OUTBOUND_PROBE)
        .map_err(|source| CollectorError::Connection {
            addr: OUTBOUND_PROBE.into(),
            source,
        })?;

    Ok(socket.local_addr()?.ip().to_string())
}

fn into_launcher(config: LauncherConfig) -> Result<Box<dyn Launcher>, CollectorError> {
    Ok(match config {
        LauncherConfig::Process { program, args } => Box::new(ProcessLauncher::new(program, args)),
        LauncherConfig::ClusterJob {
            program,
            args,
            spec,
            log_dir,
        } => Box::new(ClusterLauncher::new(program, args, spec, log_dir)?),
        LauncherConfig::Custom(launcher) => launcher,
    })
}

fn shut_down() -> CollectorError {
    CollectorError::Io(std::io::Error::other("the collector was shut down"))
}

fn terminate_all(workers: &mut [WorkerSlot]) {
    for worker in workers {
        if let Err(e) = worker.handle.terminate() {
            warn!("could not terminate worker {}: {e}", worker.rank);
        }
    }
}

#[cfg(test)]
mod tests {
    use comms::specs::rollout::{EnvSpec, PolicySpec};

    use super::*;

    fn unix_config() -> CollectorConfig {
        let mut config = CollectorConfig::new(
            vec![EnvSpec::new("counter")],
            PolicySpec::new("linear"),
            4,
            4,
            LauncherConfig::Process {
                program: "worker".into(),
                args: Vec::new(),
            },
        );
        config.backend = Backend::Unix;
        config
    }

    #[test]
    fn default_socket_paths_are_unique_within_a_process() {
        let (first, _) = resolve_addr(&unix_config()).unwrap();
        let (second, _) = resolve_addr(&unix_config()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn missing_buffer_reads_as_a_shutdown() {
        let err = shut_down();
        assert!(matches!(err, CollectorError::Io(_)));
        assert_eq!(err.to_string(), "io error: the collector was shut down");
    }

    #[test]
    fn explicit_socket_path_is_kept() {
        let mut config = unix_config();
        config.socket_path = Some("/tmp/explicit.sock".into());

        let (bind, advertised) = resolve_addr(&config).unwrap();
        assert_eq!(bind, "/tmp/explicit.sock");
        assert_eq!(advertised, bind);
    }
}
