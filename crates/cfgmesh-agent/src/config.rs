//! Agent runtime configuration.
//!
//! Grounded on `clawnode::config::NodeConfig`'s `load`/`save` convention:
//! a plain serde struct with field defaults, loadable from a JSON file or
//! (here, since the agent has no positional config file by default) from
//! environment variables.

use serde::{Deserialize, Serialize};

fn default_poll_interval() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    10
}

fn default_registration_max_retries() -> u32 {
    5
}

fn default_registration_initial_backoff() -> u64 {
    1
}

fn default_registration_max_backoff() -> u64 {
    30
}

fn default_registration_backoff_multiplier() -> f64 {
    2.0
}

fn default_heartbeat_enabled() -> bool {
    true
}

fn default_agent_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Configuration for the cfgmesh agent: where the controller and local
/// worker live, and the retry/heartbeat tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub controller_url: String,
    pub worker_url: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    pub agent_user: String,
    pub agent_password: String,
    #[serde(default = "default_registration_max_retries")]
    pub registration_max_retries: u32,
    #[serde(default = "default_registration_initial_backoff")]
    pub registration_initial_backoff: u64,
    #[serde(default = "default_registration_max_backoff")]
    pub registration_max_backoff: u64,
    #[serde(default = "default_registration_backoff_multiplier")]
    pub registration_backoff_multiplier: f64,
    #[serde(default = "default_agent_hostname")]
    pub agent_hostname: String,
    #[serde(default = "default_heartbeat_enabled")]
    pub heartbeat_enabled: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            controller_url: "http://localhost:8080".to_string(),
            worker_url: "http://localhost:8082".to_string(),
            poll_interval: default_poll_interval(),
            request_timeout: default_request_timeout(),
            agent_user: "agent".to_string(),
            agent_password: String::new(),
            registration_max_retries: default_registration_max_retries(),
            registration_initial_backoff: default_registration_initial_backoff(),
            registration_max_backoff: default_registration_max_backoff(),
            registration_backoff_multiplier: default_registration_backoff_multiplier(),
            agent_hostname: default_agent_hostname(),
            heartbeat_enabled: default_heartbeat_enabled(),
        }
    }
}

impl AgentConfig {
    /// Loads from `path` if given, otherwise from environment variables
    /// (`CONTROLLER_URL`, `WORKER_URL`, `POLL_INTERVAL`, `REQUEST_TIMEOUT`,
    /// `AGENT_USER`, `AGENT_PASSWORD`, `REGISTRATION_MAX_RETRIES`,
    /// `REGISTRATION_INITIAL_BACKOFF`, `REGISTRATION_MAX_BACKOFF`,
    /// `REGISTRATION_BACKOFF_MULTIPLIER`, `AGENT_HOSTNAME`,
    /// `HEARTBEAT_ENABLED`).
    pub fn load(path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        if let Some(path) = path {
            let text = std::fs::read_to_string(path)?;
            return Ok(serde_json::from_str(&text)?);
        }

        let defaults = Self::default();
        Ok(Self {
            controller_url: std::env::var("CONTROLLER_URL")
                .unwrap_or(defaults.controller_url),
            worker_url: std::env::var("WORKER_URL").unwrap_or(defaults.worker_url),
            poll_interval: std::env::var("POLL_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.poll_interval),
            request_timeout: std::env::var("REQUEST_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.request_timeout),
            agent_user: std::env::var("AGENT_USER").unwrap_or(defaults.agent_user),
            agent_password: std::env::var("AGENT_PASSWORD").unwrap_or_default(),
            registration_max_retries: std::env::var("REGISTRATION_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.registration_max_retries),
            registration_initial_backoff: std::env::var("REGISTRATION_INITIAL_BACKOFF")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.registration_initial_backoff),
            registration_max_backoff: std::env::var("REGISTRATION_MAX_BACKOFF")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.registration_max_backoff),
            registration_backoff_multiplier: std::env::var("REGISTRATION_BACKOFF_MULTIPLIER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.registration_backoff_multiplier),
            agent_hostname: std::env::var("AGENT_HOSTNAME").unwrap_or(defaults.agent_hostname),
            heartbeat_enabled: std::env::var("HEARTBEAT_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.heartbeat_enabled),
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

    pub fn registration_retry_config(&self) -> cfgmesh_retry::RetryConfig {
        cfgmesh_retry::RetryConfig {
            max_retries: self.registration_max_retries,
            initial: std::time::Duration::from_secs(self.registration_initial_backoff),
            cap: std::time::Duration::from_secs(self.registration_max_backoff),
            multiplier: self.registration_backoff_multiplier,
            jitter: false,
        }
    }
}
