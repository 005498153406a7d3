pub mod rollout;
pub mod worker;
