use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Deserialize;

use super::Policy;
use crate::{ParamMap, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RandomParams {
    pub seed: u64,
}

/// Acts uniformly at random in `[-1, 1]`, it has no parameters to sync.
pub struct RandomPolicy {
    rng: Mutex<StdRng>,
}

impl RandomPolicy {
    pub fn new(params: RandomParams) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(params.seed)),
        }
    }
}

impl Policy for RandomPolicy {
    fn act(&self, _obs: &[f32], action: &mut [f32]) {
        let mut rng = self.rng.lock();
        for a in action {
            *a = rng.random_range(-1.0..=1.0);
        }
    }

    fn params(&self) -> ParamMap {
        ParamMap::new()
    }

    fn load_params(&mut self, _params: &ParamMap) -> Result<()> {
        Ok(())
    }

    fn boxed_clone(&self) -> Box<dyn Policy> {
        Box::new(Self {
            rng: Mutex::new(self.rng.lock().clone()),
        })
    }
}
