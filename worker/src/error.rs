use std::{error::Error, fmt, io};

use rollout::RolloutErr;

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, WorkerErr>;

/// Worker runtime failures.
#[derive(Debug)]
pub enum WorkerErr {
    Io(io::Error),
    InvalidConfig(String),
    Rollout(RolloutErr),
    UnexpectedMessage { batch: usize, got: &'static str },
    Coordinator(String),
}

impl fmt::Display for WorkerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerErr::Io(e) => write!(f, "io error: {e}"),
            WorkerErr::InvalidConfig(detail) => write!(f, "invalid worker config: {detail}"),
            WorkerErr::Rollout(e) => write!(f, "rollout error: {e}"),
            WorkerErr::UnexpectedMessage { batch, got } => {
                write!(f, "unexpected message after batch {batch}: got {got}")
            }
            WorkerErr::Coordinator(detail) => write!(f, "coordinator reported: {detail}"),
        }
    }
}

impl Error for WorkerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorkerErr::Io(e) => Some(e),
            WorkerErr::Rollout(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WorkerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<RolloutErr> for WorkerErr {
    fn from(value: RolloutErr) -> Self {
        Self::Rollout(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<WorkerErr> for io::Error {
    fn from(value: WorkerErr) -> Self {
        match value {
            WorkerErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
