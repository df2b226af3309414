//! `stockctl` configuration file.
//!
//! ```toml
//! [storage]
//! data_dir = "/var/lib/stockroom"
//! # sqlite_path = "/var/lib/stockroom/stock.sqlite"
//!
//! [limits]
//! max_payload_len = 2000
//! max_batch = 200
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stockroom_core::{ServiceConfig, StockLimits};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,

    /// Overrides `{data_dir}/stock.sqlite`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtlConfig {
    pub storage: StorageConfig,

    #[serde(default)]
    pub limits: StockLimits,
}

impl CtlConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        let config: CtlConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Reject configurations that would open the wrong store or accept nothing.
    pub fn verify(&self) -> anyhow::Result<()> {
        if self.storage.data_dir.trim().is_empty() {
            anyhow::bail!("storage.data_dir is empty in configuration.");
        }
        if self.limits.max_payload_len == 0 {
            anyhow::bail!("limits.max_payload_len must be at least 1.");
        }
        if self.limits.max_batch == 0 {
            anyhow::bail!("limits.max_batch must be at least 1.");
        }
        Ok(())
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            data_dir: Some(PathBuf::from(&self.storage.data_dir)),
            sqlite_path: self.storage.sqlite_path.as_ref().map(PathBuf::from),
            limits: self.limits,
        }
    }
}
