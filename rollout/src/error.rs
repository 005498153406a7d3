use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used in the entire rollout module.
pub type Result<T> = std::result::Result<T, RolloutErr>;

/// The rollout module's error type.
#[derive(Debug)]
pub enum RolloutErr {
    InvalidConfig(String),
    UnknownKind {
        what: &'static str,
        kind: String,
    },
    ShapeMismatch {
        what: String,
        got: usize,
        expected: usize,
    },
    UnknownParam(String),
    Locked,
    Closed,
}

impl Display for RolloutErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RolloutErr::InvalidConfig(detail) => format!("Invalid rollout configuration: {detail}"),
            RolloutErr::UnknownKind { what, kind } => format!("There's no {what} named {kind:?}"),
            RolloutErr::ShapeMismatch {
                what,
                got,
                expected,
            } => format!("There's a size mismatch in {what}, got {got} and expected {expected}"),
            RolloutErr::UnknownParam(name) => format!("The policy has no parameter named {name:?}"),
            RolloutErr::Locked => "The batch is locked, its fields can't be added or removed".into(),
            RolloutErr::Closed => "The collector was already shut down".into(),
        };

        write!(f, "{s}")
    }
}

impl Error for RolloutErr {}
