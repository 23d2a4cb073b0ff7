//! Agent-local session state (§3/§9): the process-wide "current ETag /
//! agent id / poll interval" collection, modeled as an owned, lock-
//! protected record rather than free variables.

use tokio::sync::RwLock;

use cfgmesh_proto::ConfigPayload;

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub agent_id: Option<String>,
    pub api_token: Option<String>,
    pub poll_url: Option<String>,
    pub poll_interval_seconds: Option<u64>,
    pub current_etag: Option<String>,
    pub current_config: Option<ConfigPayload>,
}

/// Thread-safe handle to the session state, shared between the scheduler
/// and (if the agent ever grows its own HTTP surface) request handlers.
#[derive(Debug, Default, Clone)]
pub struct AgentSession(std::sync::Arc<RwLock<SessionState>>);

impl AgentSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_identity(&self, agent_id: String, api_token: String, poll_url: String, poll_interval_seconds: u64) {
        let mut s = self.0.write().await;
        s.agent_id = Some(agent_id);
        s.api_token = Some(api_token);
        s.poll_url = Some(poll_url);
        s.poll_interval_seconds = Some(poll_interval_seconds);
    }

    pub async fn api_token(&self) -> Option<String> {
        self.0.read().await.api_token.clone()
    }

    pub async fn current_etag(&self) -> Option<String> {
        self.0.read().await.current_etag.clone()
    }

    pub async fn poll_interval_seconds(&self) -> Option<u64> {
        self.0.read().await.poll_interval_seconds
    }

    pub async fn set_poll_interval_seconds(&self, seconds: u64) {
        self.0.write().await.poll_interval_seconds = Some(seconds);
    }

    /// Records a newly observed configuration version. Returns `true` if
    /// the ETag actually advanced (i.e. this is not a redundant update).
    pub async fn observe(&self, etag: String, config: ConfigPayload, poll_interval_seconds: Option<u64>) -> bool {
        let mut s = self.0.write().await;
        let advanced = s.current_etag.as_deref() != Some(etag.as_str());
        s.current_etag = Some(etag);
        s.current_config = Some(config);
        if let Some(seconds) = poll_interval_seconds {
            s.poll_interval_seconds = Some(seconds);
        }
        advanced
    }

    pub async fn snapshot(&self) -> SessionState {
        self.0.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn observe_reports_whether_etag_advanced() {
        let session = AgentSession::new();
        let payload = ConfigPayload {
            url: "https://example.com".to_string(),
            proxy: None,
            extra: Default::default(),
        };
        assert!(session.observe("etag-1".to_string(), payload.clone(), Some(5)).await);
        assert!(!session.observe("etag-1".to_string(), payload.clone(), Some(5)).await);
        assert!(session.observe("etag-2".to_string(), payload, Some(5)).await);
    }

    #[tokio::test]
    async fn set_identity_then_snapshot_reflects_fields() {
        let session = AgentSession::new();
        session
            .set_identity("a1".to_string(), "tok".to_string(), "/config".to_string(), 5)
            .await;
        let snap = session.snapshot().await;
        assert_eq!(snap.agent_id.as_deref(), Some("a1"));
        assert_eq!(snap.poll_interval_seconds, Some(5));
    }
}
