mod linear;
mod random;

pub use linear::{LinearParams, LinearPolicy};
pub use random::{RandomParams, RandomPolicy};

use crate::{ParamMap, Result};

/// Maps observations into actions.
pub trait Policy: Send + Sync {
    /// Writes the action for `obs` into `action`.
    fn act(&self, obs: &[f32], action: &mut [f32]);

    /// A copy of the current parameters, empty for parameterless policies.
    fn params(&self) -> ParamMap;

    /// Replaces the current parameters, names and shapes must match `params()`.
    fn load_params(&mut self, params: &ParamMap) -> Result<()>;

    fn boxed_clone(&self) -> Box<dyn Policy>;

    /// Replaces the current parameters from their flat, name ordered, values.
    fn load_flat(&mut self, flat: &[f32]) -> Result<()> {
        let mut params = self.params();
        params.load_flat(flat)?;
        self.load_params(&params)
    }
}
