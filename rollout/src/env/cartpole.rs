use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Deserialize;

use super::{Env, Transition};

const GRAVITY: f32 = 9.8;
const CART_MASS: f32 = 1.0;
const POLE_MASS: f32 = 0.1;
const POLE_LENGTH: f32 = 0.5;
const FORCE_MAG: f32 = 10.0;
const DT: f32 = 0.02;
const X_THRESHOLD: f32 = 2.4;
const THETA_THRESHOLD: f32 = 12.0 * std::f32::consts::PI / 180.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CartPoleParams {
    pub max_steps: u32,
    /// Initial state values are drawn from `[-init_range, init_range]`.
    pub init_range: f32,
}

impl Default for CartPoleParams {
    fn default() -> Self {
        Self {
            max_steps: 200,
            init_range: 0.05,
        }
    }
}

/// The classic cart-pole balancing task.
///
/// The observation is `[x, x_dot, theta, theta_dot]`, a positive `action[0]`
/// pushes the cart right, anything else pushes it left.
pub struct CartPole {
    params: CartPoleParams,
    state: [f32; 4],
    steps: u32,
}

impl CartPole {
    pub fn new(params: CartPoleParams) -> Self {
        Self {
            params,
            state: [0.; 4],
            steps: 0,
        }
    }
}

impl Env for CartPole {
    fn observation_size(&self) -> usize {
        4
    }

    fn action_size(&self) -> usize {
        1
    }

    fn reset(&mut self, seed: u64, obs: &mut [f32]) {
        let mut rng = StdRng::seed_from_u64(seed);
        let range = self.params.init_range.abs();

        for x in &mut self.state {
            *x = rng.random_range(-range..=range);
        }

        self.steps = 0;
        obs.copy_from_slice(&self.state);
    }

    fn step(&mut self, action: &[f32], obs: &mut [f32]) -> Transition {
        let [x, x_dot, theta, theta_dot] = self.state;
        let force = if action[0] > 0. { FORCE_MAG } else { -FORCE_MAG };

        let cos_theta = theta.cos();
        let sin_theta = theta.sin();
        let total_mass = CART_MASS + POLE_MASS;
        let pole_mass_length = POLE_MASS * POLE_LENGTH;

        let temp = (force + pole_mass_length * theta_dot * theta_dot * sin_theta) / total_mass;
        let theta_acc = (GRAVITY * sin_theta - cos_theta * temp)
            / (POLE_LENGTH * (4.0 / 3.0 - POLE_MASS * cos_theta * cos_theta / total_mass));
        let x_acc = temp - pole_mass_length * theta_acc * cos_theta / total_mass;

        let x = x + DT * x_dot;
        let theta = theta + DT * theta_dot;
        self.state = [x, x_dot + DT * x_acc, theta, theta_dot + DT * theta_acc];
        self.steps += 1;
        obs.copy_from_slice(&self.state);

        Transition {
            reward: 1.,
            terminated: x.abs() > X_THRESHOLD || theta.abs() > THETA_THRESHOLD,
            truncated: self.steps >= self.params.max_steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_is_seeded_and_bounded() {
        let mut env = CartPole::new(CartPoleParams::default());
        let (mut a, mut b) = ([0.; 4], [0.; 4]);

        env.reset(42, &mut a);
        env.reset(42, &mut b);

        assert_eq!(a, b);
        assert!(a.iter().all(|x| x.abs() <= 0.05));
    }

    #[test]
    fn pushing_one_way_ends_the_episode() {
        let mut env = CartPole::new(CartPoleParams::default());
        let mut obs = [0.; 4];
        env.reset(0, &mut obs);

        let mut steps = 0;
        loop {
            steps += 1;
            let t = env.step(&[1.], &mut obs);
            if t.done() {
                assert!(t.terminated);
                break;
            }
        }

        assert!(steps < 200);
    }

    #[test]
    fn step_limit_truncates() {
        let mut env = CartPole::new(CartPoleParams {
            max_steps: 3,
            init_range: 0.,
        });
        let mut obs = [0.; 4];
        env.reset(0, &mut obs);

        let mut action = 1.;
        let mut last = None;
        for _ in 0..3 {
            last = Some(env.step(&[action], &mut obs));
            action = -action;
        }

        let last = last.unwrap();
        assert!(last.truncated && !last.terminated);
    }
}
