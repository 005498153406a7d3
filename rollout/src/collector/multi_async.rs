use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, SyncSender},
    },
    thread::{self, JoinHandle},
};

use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex, RwLock};

use super::{CollectorOptions, frames::EnvSlot, slot_seed};
use crate::{Batch, ParamMap, Result, RolloutErr, env::Env, policy::Policy};

type SharedPolicy = Arc<RwLock<Box<dyn Policy>>>;

/// A batch tagged with the parameter generation it was produced with.
type Tagged = (u64, Result<Batch>);

/// Counts parameter loads, runners wait on it while it is still 0.
#[derive(Default)]
struct Generation {
    current: Mutex<u64>,
    changed: Condvar,
}

impl Generation {
    fn get(&self) -> u64 {
        *self.current.lock()
    }

    fn bump(&self) -> u64 {
        let mut current = self.current.lock();
        *current += 1;
        self.changed.notify_all();
        *current
    }

    /// Blocks until the first load or until `stop` is raised.
    ///
    /// # Returns
    /// `false` if stopped first.
    fn wait_first(&self, stop: &AtomicBool) -> bool {
        let mut current = self.current.lock();
        while *current == 0 && !stop.load(Ordering::Acquire) {
            self.changed.wait(&mut current);
        }

        *current > 0
    }

    /// Raises `stop` and wakes every waiting runner.
    fn stop(&self, stop: &AtomicBool) {
        // Stored under the lock so no runner misses it between its check and its wait.
        let _current = self.current.lock();
        stop.store(true, Ordering::Release);
        self.changed.notify_all();
    }
}

/// Runs every environment on its own thread, each yielding full size batches
/// that are handed out in arrival order.
///
/// Batches produced before the latest `load_flat` are dropped, so every batch
/// handed out was acted with the most recently loaded parameters.
pub struct AsyncCollector {
    rx: Option<Receiver<Tagged>>,
    policies: Vec<SharedPolicy>,
    generation: Arc<Generation>,
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    total_frames: usize,
    frames: usize,
}

impl AsyncCollector {
    /// Creates a new `AsyncCollector` and starts its threads.
    ///
    /// # Arguments
    /// * `envs` - One environment per thread.
    /// * `policy` - The acting policy.
    /// * `frames_per_batch` - Frames in every batch, all from the same environment.
    /// * `total_frames` - Frames to yield before the collector is exhausted.
    /// * `options` - Seeding and reset behaviour.
    /// * `share_policy` - Whether every thread acts with the same policy instance
    ///   instead of a private copy.
    /// * `await_params` - Hold the threads until parameters are loaded, unless
    ///   the policy has none.
    pub fn new(
        envs: Vec<Box<dyn Env>>,
        policy: Box<dyn Policy>,
        frames_per_batch: usize,
        total_frames: usize,
        options: &CollectorOptions,
        share_policy: bool,
        await_params: bool,
    ) -> Self {
        let n = envs.len();
        let generation = Arc::new(Generation::default());
        if !await_params || policy.params().is_empty() {
            generation.bump();
        }

        let policies: Vec<SharedPolicy> = if share_policy {
            vec![Arc::new(RwLock::new(policy))]
        } else {
            (0..n)
                .map(|_| Arc::new(RwLock::new(policy.boxed_clone())))
                .collect()
        };

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::sync_channel(n);

        let threads = envs
            .into_iter()
            .enumerate()
            .map(|(i, env)| {
                let slot = EnvSlot::new(env, slot_seed(options.seed, i));
                let policy = Arc::clone(&policies[i % policies.len()]);
                let runner = Runner {
                    slot,
                    policy,
                    generation: Arc::clone(&generation),
                    stop: Arc::clone(&stop),
                    tx: tx.clone(),
                    frames_per_batch,
                    reset_at_each_batch: options.reset_at_each_batch,
                };

                thread::spawn(move || runner.run())
            })
            .collect();

        Self {
            rx: Some(rx),
            policies,
            generation,
            stop,
            threads,
            total_frames,
            frames: 0,
        }
    }

    pub fn next_batch(&mut self) -> Option<Result<Batch>> {
        if self.frames >= self.total_frames {
            return None;
        }

        let Some(rx) = &self.rx else {
            return Some(Err(RolloutErr::Closed));
        };

        loop {
            let (generation, batch) = match rx.recv() {
                Ok(tagged) => tagged,
                Err(_) => return Some(Err(RolloutErr::Closed)),
            };

            let current = self.generation.get();
            if generation < current {
                trace!("dropping a batch of generation {generation}, current is {current}");
                continue;
            }

            if let Ok(batch) = &batch {
                self.frames += batch.numel();
            }

            return Some(batch);
        }
    }

    pub fn params(&self) -> ParamMap {
        self.policies[0].read().params()
    }

    /// Loads new parameters into every policy, batches produced with the old
    /// ones are dropped from then on.
    pub fn load_flat(&mut self, flat: &[f32]) -> Result<()> {
        for policy in &self.policies {
            policy.write().load_flat(flat)?;
        }

        // Bumped once every policy holds the new values, so a batch tagged with
        // the new generation never saw the old ones.
        let generation = self.generation.bump();
        debug!("loaded parameters, generation {generation}");
        Ok(())
    }

    pub fn shutdown(&mut self) {
        if self.rx.is_none() {
            return;
        }

        self.generation.stop(&self.stop);
        // Blocked senders wake up with an error once the receiver is gone.
        drop(self.rx.take());

        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("a rollout thread panicked");
            }
        }

        debug!("async collector shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.rx.is_none()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}

impl Drop for AsyncCollector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Runner {
    slot: EnvSlot,
    policy: SharedPolicy,
    generation: Arc<Generation>,
    stop: Arc<AtomicBool>,
    tx: SyncSender<Tagged>,
    frames_per_batch: usize,
    reset_at_each_batch: bool,
}

impl Runner {
    fn run(mut self) {
        if !self.generation.wait_first(&self.stop) {
            return;
        }

        let mut first = true;

        while !self.stop.load(Ordering::Acquire) {
            if self.reset_at_each_batch && !first {
                self.slot.reset();
            }
            first = false;

            let mut frames = self.slot.frames(self.frames_per_batch);
            let generation = {
                let policy = self.policy.read();
                let generation = self.generation.get();
                self.slot.rollout(&**policy, self.frames_per_batch, &mut frames);
                generation
            };

            if self.tx.send((generation, frames.into_batch())).is_err() {
                break;
            }
        }
    }
}
