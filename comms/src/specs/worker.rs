use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::rollout::{EnvSpec, PolicySpec};

/// Wire-level bootstrap specification for a worker instance.
///
/// Handed to the launcher by the coordinator and passed verbatim to the
/// worker process, it carries everything the worker needs to join the group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// The worker's rank in the group, the coordinator is rank 0.
    pub rank: usize,
    /// Number of members in the group, coordinator included.
    pub world_size: usize,
    /// Where the coordinator listens, `host:port` or a socket path.
    pub addr: String,
    pub backend: Backend,
    pub kind: CollectorKind,
    /// Sub-environments driven by the local collector.
    pub num_envs: usize,
    pub env: EnvSpec,
    pub policy: PolicySpec,
    /// Frames in every local batch, this worker's share of a round.
    pub frames_per_batch: usize,
    /// Frames this worker produces over the whole run.
    pub total_frames: usize,
    /// Batches between two weight broadcasts.
    pub update_interval: usize,
    /// Extra options for the local collector.
    #[serde(default)]
    pub options: serde_json::Value,
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub share_policy: bool,
}

/// The transport used between the coordinator and its workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Tcp,
    /// Unix domain sockets, every worker must run on the coordinator's host.
    Unix,
}

/// The local collector flavour every worker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorKind {
    /// One environment stepped on the calling thread.
    Single,
    /// Several environments stepped in lockstep.
    #[default]
    Sync,
    /// Several environments on their own threads, batches in arrival order.
    Async,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Unix => write!(f, "unix"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "unix" => Ok(Self::Unix),
            other => Err(format!("unknown backend {other:?}, expected tcp or unix")),
        }
    }
}

impl fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Sync => write!(f, "sync"),
            Self::Async => write!(f, "async"),
        }
    }
}

impl FromStr for CollectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Self::Single),
            "sync" => Ok(Self::Sync),
            "async" => Ok(Self::Async),
            other => Err(format!(
                "unknown collector kind {other:?}, expected single, sync or async"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_spec_travels_as_json() {
        let spec = WorkerSpec {
            rank: 2,
            world_size: 3,
            addr: "127.0.0.1:10003".into(),
            backend: Backend::Tcp,
            kind: CollectorKind::Async,
            num_envs: 2,
            env: EnvSpec::new("counter"),
            policy: PolicySpec::new("linear"),
            frames_per_batch: 8,
            total_frames: 32,
            update_interval: 1,
            options: serde_json::json!({ "seed": 7 }),
            connect_timeout_secs: 5,
            share_policy: true,
        };

        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"kind\":\"async\""));

        let back: WorkerSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn kinds_parse_from_their_names() {
        assert_eq!("single".parse(), Ok(CollectorKind::Single));
        assert_eq!("unix".parse(), Ok(Backend::Unix));
        assert!("multi".parse::<CollectorKind>().is_err());
    }
}
