//! Shared controller state: the configuration history, the agent registry,
//! the audit log, and the best-effort change-notification bus.
//!
//! Grounded on `clawnode`'s `SharedState` shape (one struct threaded through
//! every handler via axum's `State` extractor) generalized to the
//! controller's three stores plus a broadcast channel.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use cfgmesh_auth::{AgentStore, AuditLogStore};
use cfgmesh_persist::ConfigHistoryStore;
use cfgmesh_proto::ChangeNotification;

use crate::config::ControllerConfig;

/// Capacity of the in-process change-notification broadcast channel. A full
/// channel drops the oldest notification rather than applying backpressure
/// to the write path — push is a latency hint, never a source of truth.
const NOTIFY_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct AppState(Arc<Inner>);

struct Inner {
    pub config: ControllerConfig,
    pub configs: Mutex<ConfigHistoryStore>,
    pub agents: Mutex<AgentStore>,
    pub audit: Mutex<AuditLogStore>,
    pub notify: broadcast::Sender<ChangeNotification>,
}

impl AppState {
    pub async fn load(config: ControllerConfig) -> anyhow::Result<Self> {
        let configs = ConfigHistoryStore::load(&config.state_dir).await?;
        let agents = AgentStore::load(&config.state_dir).await?;
        let audit = AuditLogStore::load(&config.state_dir).await?;
        let (notify, _rx) = broadcast::channel(NOTIFY_CHANNEL_CAPACITY);
        Ok(Self(Arc::new(Inner {
            config,
            configs: Mutex::new(configs),
            agents: Mutex::new(agents),
            audit: Mutex::new(audit),
            notify,
        })))
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.0.config
    }

    pub fn configs(&self) -> &Mutex<ConfigHistoryStore> {
        &self.0.configs
    }

    pub fn agents(&self) -> &Mutex<AgentStore> {
        &self.0.agents
    }

    pub fn audit(&self) -> &Mutex<AuditLogStore> {
        &self.0.audit
    }

    /// Resolves the effective poll interval for an agent: its own override
    /// if set, otherwise the global default.
    pub fn effective_interval(&self, agent_override: Option<u64>) -> u64 {
        agent_override.unwrap_or(self.0.config.poll_interval)
    }

    /// Publishes a change notification to any subscribed listeners.
    /// Fire-and-forget: no subscribers is not an error.
    pub fn publish(&self, etag: String, agent_id: Option<Uuid>) {
        let notification = ChangeNotification {
            etag,
            correlation_id: Uuid::new_v4(),
            agent_id,
        };
        // send() only errors when there are zero receivers, which is the
        // expected steady state when no agent has opted into push.
        let _ = self.0.notify.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.0.notify.subscribe()
    }
}
