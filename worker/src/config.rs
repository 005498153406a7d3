use std::num::NonZeroUsize;

use comms::specs::worker::WorkerSpec;

use crate::{Result, WorkerErr};

/// Immutable execution bounds for a worker instance.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    rank: usize,
    total_frames: usize,
    update_interval: NonZeroUsize,
}

impl WorkerConfig {
    /// Creates a new worker configuration.
    ///
    /// # Args
    /// * `rank` - The worker's rank, used for observability.
    /// * `total_frames` - Frames this worker produces over the whole run.
    /// * `update_interval` - Batches between two weight updates.
    ///
    /// # Returns
    /// A `WorkerConfig` instance.
    pub fn new(rank: usize, total_frames: usize, update_interval: NonZeroUsize) -> Self {
        Self {
            rank,
            total_frames,
            update_interval,
        }
    }

    /// Extracts the execution bounds of a bootstrap spec.
    ///
    /// # Errors
    /// `WorkerErr::InvalidConfig` if the update interval is zero.
    pub fn from_spec(spec: &WorkerSpec) -> Result<Self> {
        let update_interval = NonZeroUsize::new(spec.update_interval).ok_or_else(|| {
            WorkerErr::InvalidConfig("the update interval must be positive".into())
        })?;

        Ok(Self::new(spec.rank, spec.total_frames, update_interval))
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn update_interval(&self) -> usize {
        self.update_interval.get()
    }
}
