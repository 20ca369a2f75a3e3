use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node: NodeSettings,
    #[serde(default)]
    pub governance: GovernanceSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    /// This node's governance identity; also the id of its solo raft.
    pub node_id: String,
    /// Directory for the identity key file.
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceSettings {
    /// Days of inactivity before an active member expires.
    pub expiry_window_days: u64,
    /// Seconds between liveness sweeps.
    pub liveness_tick_secs: u64,
}

impl Default for GovernanceSettings {
    fn default() -> Self {
        Self {
            expiry_window_days: 90,
            liveness_tick_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// `"rocksdb"` or `"memory"`.
    pub backend: String,
    /// Database path; defaults to `<data_dir>/governance`.
    pub path: Option<PathBuf>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: "rocksdb".to_string(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node: NodeSettings {
                node_id: String::new(),
                data_dir: PathBuf::from("./data"),
            },
            governance: GovernanceSettings::default(),
            storage: StorageSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.node.node_id.is_empty(), "node.node_id must be set");
        anyhow::ensure!(
            matches!(self.storage.backend.as_str(), "rocksdb" | "memory"),
            "storage.backend must be \"rocksdb\" or \"memory\", got {:?}",
            self.storage.backend
        );
        Ok(())
    }

    pub fn expiry_window(&self) -> Duration {
        Duration::from_secs(self.governance.expiry_window_days * 24 * 3600)
    }

    pub fn liveness_tick(&self) -> Duration {
        Duration::from_secs(self.governance.liveness_tick_secs)
    }

    pub fn storage_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| self.node.data_dir.join("governance"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config: NodeConfig = toml::from_str(
            r#"
            [node]
            node_id = "otter-a"
            data_dir = "/var/lib/otter"
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.node.node_id, "otter-a");
        assert_eq!(config.governance.expiry_window_days, 90);
        assert_eq!(config.governance.liveness_tick_secs, 3600);
        assert_eq!(config.storage.backend, "rocksdb");
        assert_eq!(
            config.storage_path(),
            PathBuf::from("/var/lib/otter/governance")
        );
    }

    #[test]
    fn test_validate_rejects_missing_node_id() {
        let config = NodeConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_backend() {
        let mut config = NodeConfig::default();
        config.node.node_id = "otter-a".to_string();
        config.storage.backend = "sqlite".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations() {
        let mut config = NodeConfig::default();
        config.governance.expiry_window_days = 1;
        config.governance.liveness_tick_secs = 60;
        assert_eq!(config.expiry_window(), Duration::from_secs(86_400));
        assert_eq!(config.liveness_tick(), Duration::from_secs(60));
    }
}
