use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration recognized by the master.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MasterConfig {
    /// Address the HTTP surface listens on.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Directory holding the metadata index.
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Volume endpoints ("host:port" or "host:port/sub"), in configuration
    /// order. Placement scores by name, so reordering this list does not
    /// move data; adding or removing an entry moves roughly 1/V of keys.
    pub volumes: Vec<String>,

    /// Replicas written per key.
    #[serde(default = "default_replicas")]
    pub replicas: usize,

    /// Subvolume partitions per volume.
    #[serde(default = "default_subvolumes")]
    pub subvolumes: u32,

    /// Refuse DELETE of live keys.
    #[serde(default)]
    pub protect: bool,

    /// Compute and store an MD5 content digest on write.
    #[serde(default)]
    pub md5sum: bool,

    /// Timeout for HEAD probes against volumes, in milliseconds.
    #[serde(default = "default_voltimeout_ms")]
    pub voltimeout_ms: u64,
}

fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_index_path() -> PathBuf {
    PathBuf::from("/tmp/volt-index")
}

fn default_replicas() -> usize {
    3
}

fn default_subvolumes() -> u32 {
    10
}

fn default_voltimeout_ms() -> u64 {
    1000
}

impl MasterConfig {
    pub fn voltimeout(&self) -> Duration {
        Duration::from_millis(self.voltimeout_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.volumes.is_empty() {
            anyhow::bail!("config: no volumes");
        }
        if self.replicas == 0 {
            anyhow::bail!("config: replicas must be at least 1");
        }
        if self.replicas > self.volumes.len() {
            anyhow::bail!(
                "config: {} replicas requested but only {} volumes",
                self.replicas,
                self.volumes.len()
            );
        }
        if self.subvolumes == 0 {
            anyhow::bail!("config: subvolumes must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(volumes: &[&str], replicas: usize) -> MasterConfig {
        MasterConfig {
            listen: default_listen(),
            index_path: default_index_path(),
            volumes: volumes.iter().map(|s| s.to_string()).collect(),
            replicas,
            subvolumes: 10,
            protect: false,
            md5sum: false,
            voltimeout_ms: 1000,
        }
    }

    #[test]
    fn test_validate() {
        assert!(config(&["v1", "v2", "v3"], 2).validate().is_ok());
        assert!(config(&[], 1).validate().is_err());
        assert!(config(&["v1"], 0).validate().is_err());
        assert!(config(&["v1"], 2).validate().is_err());
        let mut bad = config(&["v1"], 1);
        bad.subvolumes = 0;
        assert!(bad.validate().is_err());
    }
}
