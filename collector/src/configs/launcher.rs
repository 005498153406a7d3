use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::launcher::Launcher;

/// How workers are started.
pub enum LauncherConfig {
    /// Local child processes running `program [args..] --spec <json>`.
    Process { program: PathBuf, args: Vec<String> },
    /// Batch jobs submitted to a cluster scheduler, running the same command.
    ClusterJob {
        program: PathBuf,
        args: Vec<String>,
        spec: ClusterSpec,
        log_dir: PathBuf,
    },
    /// Anything else.
    Custom(Box<dyn Launcher>),
}

impl fmt::Debug for LauncherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process { program, args } => f
                .debug_struct("Process")
                .field("program", program)
                .field("args", args)
                .finish(),
            Self::ClusterJob {
                program,
                args,
                spec,
                log_dir,
            } => f
                .debug_struct("ClusterJob")
                .field("program", program)
                .field("args", args)
                .field("spec", spec)
                .field("log_dir", log_dir)
                .finish(),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Resources requested for every cluster job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterSpec {
    pub timeout_min: u32,
    pub slurm_partition: String,
    pub slurm_cpus_per_task: u32,
    pub slurm_gpus_per_node: u32,
}

impl Default for ClusterSpec {
    fn default() -> Self {
        Self {
            timeout_min: 10,
            slurm_partition: "train".into(),
            slurm_cpus_per_task: 32,
            slurm_gpus_per_node: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_spec_fills_defaults_and_rejects_unknown_keys() {
        let spec: ClusterSpec = serde_json::from_str(r#"{ "slurm_partition": "gpu" }"#).unwrap();
        assert_eq!(spec.slurm_partition, "gpu");
        assert_eq!(spec.timeout_min, 10);
        assert_eq!(spec.slurm_cpus_per_task, 32);

        let res = serde_json::from_str::<ClusterSpec>(r#"{ "slurm_mem": "4G" }"#);
        assert!(res.is_err());
    }
}
