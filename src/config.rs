use std::path::PathBuf;
use std::time::Duration;

/// Settings applied to every node a provisioner prepares.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    /// Node description shown by the host scheduler's UI.
    pub description: String,
    /// Agent working directory on the provisioned worker.
    pub work_dir: PathBuf,
    /// Charset the worker writes its log in. Recorded up front because the
    /// bootstrap log is written into the build log before the worker is
    /// actually connected and able to report it.
    pub charset: String,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            description: "one-shot agent".to_string(),
            work_dir: PathBuf::from("/tmp/oneshot"),
            charset: "UTF-8".to_string(),
        }
    }
}

impl NodeSettings {
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }
}

/// Retry policy for re-locating a node by its persisted assignment name
/// after a restart.
#[derive(Debug, Clone)]
pub struct RehydrationConfig {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RehydrationConfig {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_secs(1),
        }
    }
}
