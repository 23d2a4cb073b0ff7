//! Worker runtime configuration.
//!
//! Grounded on `clawnode::config::NodeConfig`'s env-driven `load` pattern,
//! trimmed down to the two knobs the worker actually needs.

use serde::{Deserialize, Serialize};

fn default_addr() -> String {
    "0.0.0.0:8082".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl WorkerConfig {
    /// Loads from `path` if given, otherwise from `WORKER_ADDR` /
    /// `REQUEST_TIMEOUT` environment variables.
    pub fn load(path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        if let Some(path) = path {
            let text = std::fs::read_to_string(path)?;
            return Ok(serde_json::from_str(&text)?);
        }

        let defaults = Self::default();
        Ok(Self {
            addr: std::env::var("WORKER_ADDR").unwrap_or(defaults.addr),
            request_timeout: std::env::var("REQUEST_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.request_timeout),
        })
    }

    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_documented_defaults() {
        let cfg = WorkerConfig::default();
        assert_eq!(cfg.addr, "0.0.0.0:8082");
        assert_eq!(cfg.request_timeout, 10);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("worker.json");
        let mut cfg = WorkerConfig::default();
        cfg.addr = "127.0.0.1:9000".to_string();
        cfg.save(&path).expect("save");

        let loaded = WorkerConfig::load(Some(&path)).expect("load");
        assert_eq!(loaded.addr, cfg.addr);
    }
}
