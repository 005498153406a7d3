use std::{fmt, io};

use rollout::RolloutErr;

/// All errors that can occur in the collector.
#[derive(Debug)]
pub enum CollectorError {
    /// Invalid configuration, caught before launching anything.
    InvalidConfig(String),
    /// A tool the chosen launcher relies on is missing.
    UnavailableDependency { tool: &'static str },
    /// The group could not be established.
    Connection { addr: String, source: io::Error },
    /// The operation is not available on a distributed collector.
    Unsupported { operation: &'static str },
    /// A worker could not be launched.
    Launch { rank: usize, source: io::Error },
    /// New weights could not be delivered to a worker.
    Broadcast { rank: usize, source: io::Error },
    /// A worker's batch could not be gathered.
    Gather { rank: usize, source: io::Error },
    /// A round did not complete within the configured round timeout.
    RoundTimeout { round: usize },
    /// The local shape probe failed.
    Rollout(RolloutErr),
    /// An underlying I/O error not covered by the above variants.
    Io(io::Error),
}

impl fmt::Display for CollectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::UnavailableDependency { tool } => {
                write!(f, "the launcher needs {tool}, which was not found on PATH")
            }
            Self::Connection { addr, source } => {
                write!(f, "could not establish the group on {addr}: {source}")
            }
            Self::Unsupported { operation } => {
                write!(f, "{operation} is not supported by the distributed collector")
            }
            Self::Launch { rank, source } => write!(f, "failed to launch worker {rank}: {source}"),
            Self::Broadcast { rank, source } => {
                write!(f, "failed to send weights to worker {rank}: {source}")
            }
            Self::Gather { rank, source } => {
                write!(f, "failed to gather the batch of worker {rank}: {source}")
            }
            Self::RoundTimeout { round } => write!(f, "round {round} timed out"),
            Self::Rollout(e) => write!(f, "shape probe failed: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for CollectorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connection { source, .. }
            | Self::Launch { source, .. }
            | Self::Broadcast { source, .. }
            | Self::Gather { source, .. } => Some(source),
            Self::Rollout(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CollectorError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<RolloutErr> for CollectorError {
    fn from(e: RolloutErr) -> Self {
        Self::Rollout(e)
    }
}
