mod cartpole;
mod counter;

pub use cartpole::{CartPole, CartPoleParams};
pub use counter::{CountingEnv, CountingParams};

/// The outcome of a single environment step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub reward: f32,
    /// The episode reached a terminal state.
    pub terminated: bool,
    /// The episode was cut short by a step limit.
    pub truncated: bool,
}

impl Transition {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// A single, non vectorized, environment.
pub trait Env: Send {
    fn observation_size(&self) -> usize;

    fn action_size(&self) -> usize;

    /// Starts a new episode, writing its first observation into `obs`.
    fn reset(&mut self, seed: u64, obs: &mut [f32]);

    /// Advances the episode by one step, writing the next observation into `obs`.
    ///
    /// Terminated or truncated episodes are not reset automatically.
    fn step(&mut self, action: &[f32], obs: &mut [f32]) -> Transition;
}
