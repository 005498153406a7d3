use serde::Deserialize;

use super::Policy;
use crate::{ParamMap, Result, RolloutErr, Tensor};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinearParams {
    /// The value every weight starts at.
    pub init: f32,
}

/// `action = weight · obs + bias`.
#[derive(Debug, Clone)]
pub struct LinearPolicy {
    observation_size: usize,
    weight: Vec<f32>,
    bias: Vec<f32>,
}

impl LinearPolicy {
    pub fn new(observation_size: usize, action_size: usize, params: LinearParams) -> Self {
        Self {
            observation_size,
            weight: vec![params.init; observation_size * action_size],
            bias: vec![0.; action_size],
        }
    }

    fn load(dst: &mut [f32], params: &ParamMap, name: &str) -> Result<()> {
        let tensor = params
            .get(name)
            .ok_or_else(|| RolloutErr::UnknownParam(name.into()))?;

        if tensor.numel() != dst.len() {
            return Err(RolloutErr::ShapeMismatch {
                what: format!("parameter {name}"),
                got: tensor.numel(),
                expected: dst.len(),
            });
        }

        dst.copy_from_slice(tensor.data());
        Ok(())
    }
}

impl Policy for LinearPolicy {
    fn act(&self, obs: &[f32], action: &mut [f32]) {
        for ((a, row), b) in action
            .iter_mut()
            .zip(self.weight.chunks(self.observation_size.max(1)))
            .zip(&self.bias)
        {
            *a = row.iter().zip(obs).map(|(w, x)| w * x).sum::<f32>() + b;
        }
    }

    fn params(&self) -> ParamMap {
        let action_size = self.bias.len();
        let mut params = ParamMap::new();

        // SAFETY: Both lengths are derived from the same sizes in `new`.
        params.insert(
            "weight",
            Tensor::from_vec(vec![action_size, self.observation_size], self.weight.clone()).unwrap(),
        );
        params.insert(
            "bias",
            Tensor::from_vec(vec![action_size], self.bias.clone()).unwrap(),
        );
        params
    }

    fn load_params(&mut self, params: &ParamMap) -> Result<()> {
        Self::load(&mut self.weight, params, "weight")?;
        Self::load(&mut self.bias, params, "bias")
    }

    fn boxed_clone(&self) -> Box<dyn Policy> {
        Box::new(self.clone())
    }
}
