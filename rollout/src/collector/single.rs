use super::{CollectorOptions, frames::EnvSlot};
use crate::{Batch, ParamMap, Result, RolloutErr, env::Env, policy::Policy};

/// Steps a single environment on the calling thread.
pub struct SingleCollector {
    slot: Option<EnvSlot>,
    policy: Box<dyn Policy>,
    frames_per_batch: usize,
    total_frames: usize,
    frames: usize,
    reset_at_each_batch: bool,
}

impl SingleCollector {
    pub fn new(
        env: Box<dyn Env>,
        policy: Box<dyn Policy>,
        frames_per_batch: usize,
        total_frames: usize,
        options: &CollectorOptions,
    ) -> Self {
        Self {
            slot: Some(EnvSlot::new(env, options.seed)),
            policy,
            frames_per_batch,
            total_frames,
            frames: 0,
            reset_at_each_batch: options.reset_at_each_batch,
        }
    }

    pub fn next_batch(&mut self) -> Option<Result<Batch>> {
        if self.frames >= self.total_frames {
            return None;
        }

        let Some(slot) = self.slot.as_mut() else {
            return Some(Err(RolloutErr::Closed));
        };

        if self.reset_at_each_batch && self.frames > 0 {
            slot.reset();
        }

        let mut frames = slot.frames(self.frames_per_batch);
        slot.rollout(&*self.policy, self.frames_per_batch, &mut frames);
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
        self.slot = None;
    }

    pub fn is_closed(&self) -> bool {
        self.slot.is_none()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}
