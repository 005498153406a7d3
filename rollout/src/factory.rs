use comms::specs::rollout::{EnvSpec, PolicySpec};
use serde::de::DeserializeOwned;

use crate::{
    Result, RolloutErr,
    env::{CartPole, CountingEnv, Env},
    policy::{LinearPolicy, Policy, RandomPolicy},
};

/// Turns wire specs into live environments and policies.
pub trait Factory: Send + Sync {
    fn make_env(&self, spec: &EnvSpec) -> Result<Box<dyn Env>>;

    fn make_policy(
        &self,
        spec: &PolicySpec,
        observation_size: usize,
        action_size: usize,
    ) -> Result<Box<dyn Policy>>;
}

/// Resolves the environments and policies that ship with this crate.
///
/// Environments: `cartpole`, `counter`. Policies: `linear`, `random`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinFactory;

impl Factory for BuiltinFactory {
    fn make_env(&self, spec: &EnvSpec) -> Result<Box<dyn Env>> {
        match spec.kind.as_str() {
            "cartpole" => Ok(Box::new(CartPole::new(parse_params(&spec.params)?))),
            "counter" => Ok(Box::new(CountingEnv::new(parse_params(&spec.params)?))),
            other => Err(RolloutErr::UnknownKind {
                what: "environment",
                kind: other.into(),
            }),
        }
    }

    fn make_policy(
        &self,
        spec: &PolicySpec,
        observation_size: usize,
        action_size: usize,
    ) -> Result<Box<dyn Policy>> {
        match spec.kind.as_str() {
            "linear" => Ok(Box::new(LinearPolicy::new(
                observation_size,
                action_size,
                parse_params(&spec.params)?,
            ))),
            "random" => Ok(Box::new(RandomPolicy::new(parse_params(&spec.params)?))),
            other => Err(RolloutErr::UnknownKind {
                what: "policy",
                kind: other.into(),
            }),
        }
    }
}

/// Parses a JSON parameter object, `null` meaning every default.
pub fn parse_params<T>(value: &serde_json::Value) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if value.is_null() {
        return Ok(T::default());
    }

    serde_json::from_value(value.clone()).map_err(|e| RolloutErr::InvalidConfig(e.to_string()))
}
