use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

fn default_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_poll_interval() -> u64 {
    5
}

fn default_admin_user() -> String {
    "admin".to_string()
}

fn default_agent_user() -> String {
    "agent".to_string()
}

/// Controller runtime configuration. Loaded from environment variables by
/// default (`ControllerConfig::load`); `init-config` writes a starter file
/// that `run --config <path>` can load instead for local development.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "default_admin_user")]
    pub admin_user: String,
    pub admin_password: String,
    #[serde(default = "default_agent_user")]
    pub agent_user: String,
    pub agent_password: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            state_dir: default_state_dir(),
            poll_interval: default_poll_interval(),
            admin_user: default_admin_user(),
            admin_password: String::new(),
            agent_user: default_agent_user(),
            agent_password: String::new(),
        }
    }
}

impl ControllerConfig {
    /// Loads from `path` if given, otherwise from environment variables
    /// (`CONTROLLER_ADDR`, `CONTROLLER_STATE_DIR`, `POLL_INTERVAL`,
    /// `ADMIN_USER`, `ADMIN_PASSWORD`, `AGENT_USER`, `AGENT_PASSWORD`).
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = path {
            let text = std::fs::read_to_string(path)?;
            return Ok(serde_json::from_str(&text)?);
        }

        Ok(Self {
            addr: std::env::var("CONTROLLER_ADDR").unwrap_or_else(|_| default_addr()),
            state_dir: std::env::var("CONTROLLER_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_state_dir()),
            poll_interval: std::env::var("POLL_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_poll_interval),
            admin_user: std::env::var("ADMIN_USER").unwrap_or_else(|_| default_admin_user()),
            admin_password: std::env::var("ADMIN_PASSWORD").unwrap_or_default(),
            agent_user: std::env::var("AGENT_USER").unwrap_or_else(|_| default_agent_user()),
            agent_password: std::env::var("AGENT_PASSWORD").unwrap_or_default(),
        })
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
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
        let cfg = ControllerConfig::default();
        assert_eq!(cfg.addr, "0.0.0.0:8080");
        assert_eq!(cfg.poll_interval, 5);
        assert_eq!(cfg.admin_user, "admin");
        assert_eq!(cfg.agent_user, "agent");
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let mut cfg = ControllerConfig::default();
        cfg.admin_password = "secret".to_string();
        cfg.save(&path).expect("save");

        let loaded = ControllerConfig::load(Some(&path)).expect("load");
        assert_eq!(loaded.admin_password, "secret");
        assert_eq!(loaded.addr, cfg.addr);
    }
}
