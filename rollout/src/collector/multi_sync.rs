use rayon::prelude::*;

use super::{CollectorOptions, frames::EnvSlot, slot_seed};
use crate::{Batch, ParamMap, Result, RolloutErr, env::Env, policy::Policy};

/// Steps several environments with one policy, each sub-environment rolling
/// its even share of every batch on the rayon pool.
///
/// Frames are laid out environment major.
pub struct SyncCollector {
    slots: Vec<EnvSlot>,
    policy: Box<dyn Policy>,
    frames_per_batch: usize,
    total_frames: usize,
    frames: usize,
    reset_at_each_batch: bool,
    closed: bool,
}

impl SyncCollector {
    pub fn new(
        envs: Vec<Box<dyn Env>>,
        policy: Box<dyn Policy>,
        frames_per_batch: usize,
        total_frames: usize,
        options: &CollectorOptions,
    ) -> Self {
        let slots = envs
            .into_iter()
            .enumerate()
            .map(|(i, env)| EnvSlot::new(env, slot_seed(options.seed, i)))
            .collect();

        Self {
            slots,
            policy,
            frames_per_batch,
            total_frames,
            frames: 0,
            reset_at_each_batch: options.reset_at_each_batch,
            closed: false,
        }
    }

    pub fn next_batch(&mut self) -> Option<Result<Batch>> {
        if self.frames >= self.total_frames {
            return None;
        }

        if self.closed {
            return Some(Err(RolloutErr::Closed));
        }

        let steps = self.frames_per_batch / self.slots.len();
        let reset = self.reset_at_each_batch && self.frames > 0;
        let policy = &*self.policy;

        let parts: Vec<_> = self
            .slots
            .par_iter_mut()
            .map(|slot| {
                if reset {
                    slot.reset();
                }

                let mut frames = slot.frames(steps);
                slot.rollout(policy, steps, &mut frames);
                frames
            })
            .collect();

        let mut parts = parts.into_iter();
        let mut frames = parts.next()?;
        for part in parts {
            frames.append(part);
        }

        self.frames += self.frames_per_batch;
        Some(frames.into_batch())
    }

    pub fn params(&self) -> ParamMap {
        self.policy.params()
    }

    pub fn load_flat(&mut self, flat: &[f32]) -> Result<()> {
        self.policy.load_flat(flat)
    }

    pub fn shutdown(&mut self) {
        self.slots.clear();
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}
