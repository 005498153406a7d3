use serde::Deserialize;

use super::{Env, Transition};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CountingParams {
    pub episode_len: u32,
}

impl Default for CountingParams {
    fn default() -> Self {
        Self { episode_len: 10 }
    }
}

/// A deterministic environment whose observation is the step index within the
/// episode and whose reward echoes `action[0]`, which makes the acting
/// policy's parameters visible in the collected rewards.
pub struct CountingEnv {
    episode_len: u32,
    t: u32,
}

impl CountingEnv {
    pub fn new(params: CountingParams) -> Self {
        Self {
            episode_len: params.episode_len.max(1),
            t: 0,
        }
    }
}

impl Env for CountingEnv {
    fn observation_size(&self) -> usize {
        1
    }

    fn action_size(&self) -> usize {
        1
    }

    fn reset(&mut self, _seed: u64, obs: &mut [f32]) {
        self.t = 0;
        obs[0] = 0.;
    }

    fn step(&mut self, action: &[f32], obs: &mut [f32]) -> Transition {
        self.t += 1;
        obs[0] = self.t as f32;

        Transition {
            reward: action[0],
            terminated: false,
            truncated: self.t >= self.episode_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_until_truncated() {
        let mut env = CountingEnv::new(CountingParams { episode_len: 2 });
        let mut obs = [9.];
        env.reset(0, &mut obs);
        assert_eq!(obs, [0.]);

        let t = env.step(&[0.5], &mut obs);
        assert_eq!((obs[0], t.reward, t.done()), (1., 0.5, false));

        let t = env.step(&[0.5], &mut obs);
        assert_eq!(obs, [2.]);
        assert!(t.truncated);
    }
}
