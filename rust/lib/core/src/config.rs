use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Abuse ceilings applied to bulk stock mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockLimits {
    /// Longest accepted payload, in characters.
    pub max_payload_len: usize,

    /// Most entries accepted by one removal request.
    pub max_batch: usize,
}

impl Default for StockLimits {
    fn default() -> Self {
        Self {
            max_payload_len: 2000,
            max_batch: 200,
        }
    }
}

/// Common configuration shared by the stock service binaries.
///
/// Each binary parses these from command-line arguments or a config file,
/// then passes them to storage layer initialization.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory holding the database and any other state.
    pub data_dir: Option<PathBuf>,

    /// Path to the SQLite database file.
    /// Defaults to `{data_dir}/stock.sqlite` if not specified.
    pub sqlite_path: Option<PathBuf>,

    /// Bulk mutation ceilings.
    pub limits: StockLimits,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            sqlite_path: None,
            limits: StockLimits::default(),
        }
    }
}

impl ServiceConfig {
    /// Parse configuration from command-line arguments.
    ///
    /// Supported flags:
    /// - `--data-dir=PATH`
    /// - `--sqlite=PATH`
    /// - `--max-payload-len=N`
    /// - `--max-batch=N`
    ///
    /// Unparseable numbers keep the default.
    pub fn from_args(args: &[String]) -> Self {
        let mut config = ServiceConfig::default();

        for arg in args {
            if let Some(val) = arg.strip_prefix("--data-dir=") {
                config.data_dir = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--sqlite=") {
                config.sqlite_path = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--max-payload-len=") {
                if let Ok(n) = val.parse() {
                    config.limits.max_payload_len = n;
                }
            } else if let Some(val) = arg.strip_prefix("--max-batch=") {
                if let Ok(n) = val.parse() {
                    config.limits.max_batch = n;
                }
            }
        }

        config
    }

    /// Resolve the SQLite database path, falling back to `{data_dir}/stock.sqlite`.
    pub fn resolve_sqlite_path(&self) -> PathBuf {
        self.sqlite_path
            .clone()
            .unwrap_or_else(|| self.resolve_data_subpath("stock.sqlite"))
    }

    fn resolve_data_subpath(&self, name: &str) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(|d| d.join(name))
            .unwrap_or_else(|| PathBuf::from(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_args() {
        let args = vec![
            "--data-dir=/tmp/stock".to_string(),
            "--max-batch=50".to_string(),
            "--max-payload-len=oops".to_string(),
        ];
        let config = ServiceConfig::from_args(&args);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/stock")));
        assert_eq!(config.limits.max_batch, 50);
        assert_eq!(config.limits.max_payload_len, 2000);
    }

    #[test]
    fn test_resolve_defaults() {
        let config = ServiceConfig {
            data_dir: Some(PathBuf::from("/data")),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_sqlite_path(),
            PathBuf::from("/data/stock.sqlite")
        );

        let bare = ServiceConfig::default();
        assert_eq!(bare.resolve_sqlite_path(), PathBuf::from("stock.sqlite"));
    }

    #[test]
    fn limits_default_to_abuse_ceilings() {
        let limits = StockLimits::default();
        assert_eq!(limits.max_payload_len, 2000);
        assert_eq!(limits.max_batch, 200);
    }
}
