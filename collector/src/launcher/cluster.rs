use std::{
    env, io,
    path::{Path, PathBuf},
    process::{Command, Output},
    time::Duration,
};

use comms::specs::worker::WorkerSpec;
use log::{debug, info, warn};

use super::{Launcher, WorkerHandle, poll_until, worker_args};
use crate::{configs::ClusterSpec, error::CollectorError};

const POLL_EVERY: Duration = Duration::from_millis(500);

/// Submits every worker as a batch job to a slurm cluster.
pub struct ClusterLauncher {
    program: PathBuf,
    args: Vec<String>,
    spec: ClusterSpec,
    log_dir: PathBuf,
}

impl ClusterLauncher {
    /// Creates a new `ClusterLauncher`.
    ///
    /// # Errors
    /// `CollectorError::UnavailableDependency` if `sbatch` is not on `PATH`.
    pub fn new(
        program: PathBuf,
        args: Vec<String>,
        spec: ClusterSpec,
        log_dir: PathBuf,
    ) -> Result<Self, CollectorError> {
        if !on_path("sbatch") {
            return Err(CollectorError::UnavailableDependency { tool: "sbatch" });
        }

        Ok(Self {
            program,
            args,
            spec,
            log_dir,
        })
    }

    fn submit_args(&self, spec: &WorkerSpec) -> io::Result<Vec<String>> {
        let mut cmd = vec![shell_quote(&self.program.to_string_lossy())];
        cmd.extend(worker_args(&self.args, spec)?.iter().map(|a| shell_quote(a)));

        let output = self
            .log_dir
            .join(format!("worker-{}-%j.out", spec.rank))
            .to_string_lossy()
            .into_owned();

        let mut args = vec![
            "--parsable".to_string(),
            format!("--job-name=collector-worker-{}", spec.rank),
            format!("--time={}", self.spec.timeout_min),
            format!("--partition={}", self.spec.slurm_partition),
            format!("--cpus-per-task={}", self.spec.slurm_cpus_per_task),
        ];

        if self.spec.slurm_gpus_per_node > 0 {
            args.push(format!("--gpus-per-node={}", self.spec.slurm_gpus_per_node));
        }

        args.push(format!("--output={output}"));
        args.push(format!("--wrap={}", cmd.join(" ")));
        Ok(args)
    }
}

impl Launcher for ClusterLauncher {
    fn launch(&mut self, spec: &WorkerSpec) -> io::Result<Box<dyn WorkerHandle>> {
        std::fs::create_dir_all(&self.log_dir)?;

        let output = Command::new("sbatch").args(self.submit_args(spec)?).output()?;
        let stdout = checked(output, "sbatch")?;

        // --parsable prints `jobid[;cluster]`.
        let job_id = stdout
            .trim()
            .split(';')
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| io::Error::other("sbatch printed no job id"))?
            .to_string();

        info!("submitted worker rank={} job={job_id}", spec.rank);
        Ok(Box::new(ClusterHandle {
            rank: spec.rank,
            job_id,
        }))
    }
}

/// A worker running as a cluster job.
pub struct ClusterHandle {
    rank: usize,
    job_id: String,
}

impl ClusterHandle {
    /// The scheduler state of the job, `None` once it left the queue.
    fn state(&self) -> io::Result<Option<String>> {
        let output = Command::new("squeue")
            .args(["-h", "-j", &self.job_id, "-o", "%T"])
            .output()?;

        // squeue fails for ids it already forgot about.
        if !output.status.success() {
            return Ok(None);
        }

        let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!state.is_empty()).then_some(state))
    }
}

impl WorkerHandle for ClusterHandle {
    fn wait_until_ready(&mut self, timeout: Duration) -> io::Result<()> {
        let running = poll_until(timeout, POLL_EVERY, || match self.state()? {
            Some(state) => Ok(state == "RUNNING"),
            None => Err(io::Error::other(format!(
                "job {} of worker {} left the queue before running",
                self.job_id, self.rank
            ))),
        })?;

        if !running {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("job {} was not scheduled within {timeout:?}", self.job_id),
            ));
        }

        debug!("job {} of worker {} is running", self.job_id, self.rank);
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.state(), Ok(Some(_)))
    }

    fn terminate(&mut self) -> io::Result<()> {
        if !self.is_alive() {
            return Ok(());
        }

        warn!("cancelling job {} of worker {}", self.job_id, self.rank);
        let output = Command::new("scancel").arg(&self.job_id).output()?;
        checked(output, "scancel").map(|_| ())
    }

    fn wait(&mut self, timeout: Duration) -> io::Result<bool> {
        poll_until(timeout, POLL_EVERY, || Ok(self.state()?.is_none()))
    }
}

fn checked(output: Output, tool: &str) -> io::Result<String> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(io::Error::other(format!(
            "{tool} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn on_path(tool: &str) -> bool {
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| is_file(&dir.join(tool))))
        .unwrap_or(false)
}

fn is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}

/// Single quotes `arg` for `sh`.
fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use comms::specs::{
        rollout::{EnvSpec, PolicySpec},
        worker::{Backend, CollectorKind},
    };
    use serde_json::Value;

    use super::*;

    fn spec() -> WorkerSpec {
        WorkerSpec {
            rank: 3,
            world_size: 4,
            addr: "10.0.0.1:10003".into(),
            backend: Backend::Tcp,
            kind: CollectorKind::Single,
            num_envs: 1,
            env: EnvSpec::new("counter"),
            policy: PolicySpec::new("linear"),
            frames_per_batch: 8,
            total_frames: 16,
            update_interval: 1,
            options: Value::Null,
            connect_timeout_secs: 1000,
            share_policy: false,
        }
    }

    #[test]
    fn quoting_survives_embedded_quotes() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn submission_carries_the_resources_and_the_spec() {
        let launcher = ClusterLauncher {
            program: "/opt/node".into(),
            args: vec!["worker".into()],
            spec: ClusterSpec {
                slurm_gpus_per_node: 2,
                ..Default::default()
            },
            log_dir: "logs".into(),
        };

        let args = launcher.submit_args(&spec()).unwrap();
        assert_eq!(args[0], "--parsable");
        assert!(args.contains(&"--job-name=collector-worker-3".to_string()));
        assert!(args.contains(&"--partition=train".to_string()));
        assert!(args.contains(&"--gpus-per-node=2".to_string()));
        assert!(args.contains(&"--output=logs/worker-3-%j.out".to_string()));

        let wrap = args.last().unwrap();
        assert!(wrap.starts_with("--wrap='/opt/node' 'worker' '--spec' '{"));
    }

    #[test]
    fn missing_sbatch_is_reported() {
        if on_path("sbatch") {
            return;
        }

        let res = ClusterLauncher::new(
            "node".into(),
            Vec::new(),
            ClusterSpec::default(),
            "logs".into(),
        );
        assert!(matches!(
            res,
            Err(CollectorError::UnavailableDependency { tool: "sbatch" })
        ));
    }
}
