use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one governance node.
#[derive(Debug, Clone)]
pub struct GovernanceConfig {
    /// This node's governance identity; also the id of its solo raft.
    pub node_id: String,
    /// Directory holding the identity key file.
    pub data_dir: PathBuf,
    /// Inactivity threshold after which an active member expires.
    pub expiry_window: Duration,
    /// Interval between liveness sweeps.
    pub liveness_tick: Duration,
}

impl GovernanceConfig {
    pub fn new(node_id: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            node_id: node_id.into(),
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            data_dir: PathBuf::from("./data"),
            expiry_window: Duration::from_secs(90 * 24 * 3600),
            liveness_tick: Duration::from_secs(3600),
        }
    }
}
