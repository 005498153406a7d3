mod cluster;
mod process;

use std::{io, time::Duration};

use comms::specs::worker::WorkerSpec;

pub use cluster::{ClusterHandle, ClusterLauncher};
pub use process::{ProcessHandle, ProcessLauncher};

/// Starts workers from their bootstrap spec.
pub trait Launcher: Send {
    /// Starts the worker described by `spec`.
    ///
    /// # Returns
    /// A handle to the started worker or an io error if it could not be started.
    fn launch(&mut self, spec: &WorkerSpec) -> io::Result<Box<dyn WorkerHandle>>;
}

/// A started worker, as seen by the coordinator.
pub trait WorkerHandle: Send {
    /// Blocks until the worker is scheduled and running.
    ///
    /// Workers that start right away return immediately.
    fn wait_until_ready(&mut self, timeout: Duration) -> io::Result<()> {
        let _ = timeout;
        Ok(())
    }

    /// Whether the worker is still running.
    fn is_alive(&mut self) -> bool;

    /// Forcibly stops the worker, a no-op if it already exited.
    fn terminate(&mut self) -> io::Result<()>;

    /// Waits up to `timeout` for the worker to exit on its own.
    ///
    /// # Returns
    /// Whether the worker exited within the timeout.
    fn wait(&mut self, timeout: Duration) -> io::Result<bool>;
}

/// Polls `done` every `every` until it holds or `timeout` elapses.
pub(crate) fn poll_until(
    timeout: Duration,
    every: Duration,
    mut done: impl FnMut() -> io::Result<bool>,
) -> io::Result<bool> {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if done()? {
            return Ok(true);
        }

        let now = std::time::Instant::now();
        if now >= deadline {
            return Ok(false);
        }

        std::thread::sleep(every.min(deadline - now));
    }
}

/// The argument list shared by every launcher: `args.. --spec <json>`.
pub(crate) fn worker_args(args: &[String], spec: &WorkerSpec) -> io::Result<Vec<String>> {
    let json = serde_json::to_string(spec).map_err(io::Error::other)?;
    let mut all = args.to_vec();
    all.push("--spec".into());
    all.push(json);
    Ok(all)
}
