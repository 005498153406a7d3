//! Local rollout collection: environments, policies and the collectors that
//! step the former with the latter into batches of frames.

mod batch;
pub mod collector;
pub mod env;
mod error;
mod factory;
mod params;
pub mod policy;

pub use batch::{Batch, Tensor};
pub use collector::{CollectorOptions, CollectorSettings, LocalCollector};
pub use error::{Result, RolloutErr};
pub use factory::{BuiltinFactory, Factory, parse_params};
pub use params::{ParamMap, SharedParams};
