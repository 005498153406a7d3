use std::env;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use collector::{CollectorConfig, LauncherConfig, PerWorker};
use comms::specs::{
    rollout::{EnvSpec, PolicySpec},
    worker::{Backend, CollectorKind, WorkerSpec},
};
use log::info;
use rollout::BuiltinFactory;
use tokio::{runtime::Runtime, signal};

/// Distributed synchronous rollout collection.
#[derive(Parser, Debug)]
#[command(name = "node")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Runs a worker from the spec its launcher handed over.
    Worker {
        /// The worker spec, as json.
        #[arg(long)]
        spec: String,
    },
    /// Collects rollouts with local worker processes and reports what was gathered.
    Collect(CollectArgs),
}

#[derive(Args, Debug)]
struct CollectArgs {
    #[arg(long)]
    workers: usize,

    /// Frames gathered per round, across all workers.
    #[arg(long)]
    frames_per_batch: usize,

    #[arg(long)]
    total_frames: usize,

    /// single, sync or async.
    #[arg(long, default_value_t = CollectorKind::Single)]
    collector: CollectorKind,

    #[arg(long, default_value_t = 1)]
    envs_per_worker: usize,

    #[arg(long, default_value = "cartpole")]
    env: String,

    #[arg(long, default_value = "linear")]
    policy: String,

    /// tcp or unix.
    #[arg(long, default_value_t = Backend::Tcp)]
    backend: Backend,

    /// Falls back to `TCP_PORT`, then to 10003.
    #[arg(long)]
    port: Option<u16>,

    /// Rounds between two weight broadcasts.
    #[arg(long, default_value_t = 1)]
    update_interval: usize,

    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    match Cli::parse().command {
        Cmd::Worker { spec } => run_worker(&spec),
        Cmd::Collect(args) => collect(args),
    }
}

fn run_worker(spec: &str) -> anyhow::Result<()> {
    let spec: WorkerSpec = serde_json::from_str(spec).context("invalid worker spec")?;
    let runtime = Runtime::new()?;

    runtime.block_on(async {
        tokio::select! {
            report = worker::run(&spec, &BuiltinFactory) => {
                report?;
                info!("worker {} wrapping up", spec.rank);
            }
            _ = signal::ctrl_c() => {
                info!("received SIGINT");
            }
        }

        Ok::<_, anyhow::Error>(())
    })
}

fn collect(args: CollectArgs) -> anyhow::Result<()> {
    let program = env::current_exe().context("could not locate the node binary")?;
    let launcher = LauncherConfig::Process {
        program,
        args: vec!["worker".into()],
    };

    let mut config = CollectorConfig::new(
        vec![EnvSpec::new(args.env); args.workers],
        PolicySpec::new(args.policy),
        args.frames_per_batch,
        args.total_frames,
        launcher,
    );
    config.kind = args.collector;
    config.num_envs_per_worker = args.envs_per_worker;
    config.backend = args.backend;
    config.port = args.port;
    config.weight_sync.update_interval = args.update_interval;
    config.options = PerWorker::Shared(serde_json::json!({ "seed": args.seed }));

    let mut collector = collector::start(config, &BuiltinFactory)?;
    let mut batches = 0;

    for batch in collector.iter() {
        let batch = batch?;
        batches += 1;

        let reward = batch.get("reward").map(|r| mean(r.data())).unwrap_or_default();
        info!(
            "batch {batches}: frames={} mean_reward={reward:.3}",
            batch.numel()
        );
    }

    let frames = collector.frames_collected();
    collector.shutdown()?;

    println!("collected {frames} frames in {batches} batches");
    Ok(())
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.;
    }

    values.iter().sum::<f32>() / values.len() as f32
}
