mod adapter;
mod collector;
mod launcher;

pub(crate) use adapter::{Adapter, Plan, resolve_port};
pub use collector::{CollectorConfig, PerWorker, WeightSync};
pub use launcher::{ClusterSpec, LauncherConfig};
