use serde::{Deserialize, Serialize};

/// The specification for building an environment on the worker side.
///
/// `kind` is an opaque identifier (e.g. "cartpole", "counter") resolved by
/// a factory on each side. `params` carries arbitrary JSON configuration
/// for that environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvSpec {
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl EnvSpec {
    /// An environment spec with no extra parameters.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: serde_json::Value::Null,
        }
    }
}

/// The specification for building the acting policy, resolved like `EnvSpec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySpec {
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl PolicySpec {
    /// A policy spec with no extra parameters.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: serde_json::Value::Null,
        }
    }
}
