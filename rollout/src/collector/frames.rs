use crate::{Batch, Result, Tensor, env::Env, policy::Policy};

/// One environment together with its running episode.
pub(super) struct EnvSlot {
    env: Box<dyn Env>,
    obs: Vec<f32>,
    action: Vec<f32>,
    seed: u64,
    episodes: u64,
}

impl EnvSlot {
    /// Creates a new `EnvSlot` and starts its first episode.
    ///
    /// # Arguments
    /// * `env` - The environment to drive.
    /// * `seed` - The seed of the first episode, each following one increments it.
    pub fn new(env: Box<dyn Env>, seed: u64) -> Self {
        let mut slot = Self {
            obs: vec![0.; env.observation_size()],
            action: vec![0.; env.action_size()],
            env,
            seed,
            episodes: 0,
        };

        slot.reset();
        slot
    }

    pub fn reset(&mut self) {
        let seed = self.seed.wrapping_add(self.episodes);
        self.env.reset(seed, &mut self.obs);
        self.episodes += 1;
    }

    pub fn frames(&self, capacity: usize) -> Frames {
        Frames::with_capacity(self.obs.len(), self.action.len(), capacity)
    }

    /// Steps the environment `steps` times, recording every transition into `out`.
    pub fn rollout(&mut self, policy: &dyn Policy, steps: usize, out: &mut Frames) {
        for _ in 0..steps {
            policy.act(&self.obs, &mut self.action);

            out.observation.extend_from_slice(&self.obs);
            out.action.extend_from_slice(&self.action);

            let transition = self.env.step(&self.action, &mut self.obs);

            out.next_observation.extend_from_slice(&self.obs);
            out.reward.push(transition.reward);
            out.done.push(flag(transition.done()));
            out.terminated.push(flag(transition.terminated));
            out.len += 1;

            if transition.done() {
                self.reset();
            }
        }
    }
}

fn flag(b: bool) -> f32 {
    if b { 1. } else { 0. }
}

/// Column storage for recorded transitions.
pub(super) struct Frames {
    observation_size: usize,
    action_size: usize,
    len: usize,
    observation: Vec<f32>,
    action: Vec<f32>,
    next_observation: Vec<f32>,
    reward: Vec<f32>,
    done: Vec<f32>,
    terminated: Vec<f32>,
}

impl Frames {
    pub fn with_capacity(observation_size: usize, action_size: usize, capacity: usize) -> Self {
        Self {
            observation_size,
            action_size,
            len: 0,
            observation: Vec::with_capacity(capacity * observation_size),
            action: Vec::with_capacity(capacity * action_size),
            next_observation: Vec::with_capacity(capacity * observation_size),
            reward: Vec::with_capacity(capacity),
            done: Vec::with_capacity(capacity),
            terminated: Vec::with_capacity(capacity),
        }
    }

    /// Moves every frame of `other` to the end of `self`.
    pub fn append(&mut self, mut other: Frames) {
        self.observation.append(&mut other.observation);
        self.action.append(&mut other.action);
        self.next_observation.append(&mut other.next_observation);
        self.reward.append(&mut other.reward);
        self.done.append(&mut other.done);
        self.terminated.append(&mut other.terminated);
        self.len += other.len;
    }

    pub fn into_batch(self) -> Result<Batch> {
        let n = self.len;
        let mut batch = Batch::new(vec![n]);

        batch.insert(
            "observation",
            Tensor::from_vec(vec![n, self.observation_size], self.observation)?,
        )?;
        batch.insert(
            "action",
            Tensor::from_vec(vec![n, self.action_size], self.action)?,
        )?;
        batch.insert(
            "next_observation",
            Tensor::from_vec(vec![n, self.observation_size], self.next_observation)?,
        )?;
        batch.insert("reward", Tensor::from_vec(vec![n, 1], self.reward)?)?;
        batch.insert("done", Tensor::from_vec(vec![n, 1], self.done)?)?;
        batch.insert("terminated", Tensor::from_vec(vec![n, 1], self.terminated)?)?;

        Ok(batch)
    }
}
