use std::{
    io,
    path::PathBuf,
    process::{Child, Command, Stdio},
    time::Duration,
};

use comms::specs::worker::WorkerSpec;
use log::{debug, warn};

use super::{Launcher, WorkerHandle, poll_until, worker_args};

const POLL_EVERY: Duration = Duration::from_millis(20);

/// Runs every worker as a local child process.
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    /// Creates a new `ProcessLauncher`.
    ///
    /// # Arguments
    /// * `program` - The worker binary.
    /// * `args` - Arguments placed before `--spec <json>`.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&mut self, spec: &WorkerSpec) -> io::Result<Box<dyn WorkerHandle>> {
        let child = Command::new(&self.program)
            .args(worker_args(&self.args, spec)?)
            .stdin(Stdio::null())
            .spawn()?;

        debug!(
            "spawned worker rank={} pid={} program={}",
            spec.rank,
            child.id(),
            self.program.display()
        );

        Ok(Box::new(ProcessHandle {
            rank: spec.rank,
            child,
        }))
    }
}

/// A worker running as a child process.
pub struct ProcessHandle {
    rank: usize,
    child: Child,
}

impl WorkerHandle for ProcessHandle {
    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn terminate(&mut self) -> io::Result<()> {
        if !self.is_alive() {
            return Ok(());
        }

        warn!("killing worker rank={} pid={}", self.rank, self.child.id());
        self.child.kill()?;
        self.child.wait()?;
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> io::Result<bool> {
        poll_until(timeout, POLL_EVERY, || {
            Ok(self.child.try_wait()?.is_some())
        })
    }
}
