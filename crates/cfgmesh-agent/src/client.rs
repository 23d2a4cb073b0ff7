//! HTTP client for talking to the controller and the local worker.
//!
//! Grounded on `groblegark-coop`'s `broker::client` module: a thin
//! `reqwest::Client` wrapper with one method per remote operation,
//! returning our own error type rather than leaking `reqwest::Error`
//! directly through the call sites that need to branch on it.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use cfgmesh_proto::{
    ConfigEnvelope, HeartbeatRequest, HeartbeatResponse, RegisterRequest, RegisterResponse,
};

use crate::error::{AgentError, AgentResult};

/// What `poll_config` observed on the wire.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// The controller returned 304; our cached ETag is still current.
    NotModified,
    /// A new (or first) configuration version.
    Updated(ConfigEnvelope),
}

pub struct ControllerClient {
    http: Client,
    base_url: String,
    agent_user: String,
    agent_password: String,
}

impl ControllerClient {
    pub fn new(base_url: impl Into<String>, agent_user: impl Into<String>, agent_password: impl Into<String>, timeout: Duration) -> AgentResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AgentError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            agent_user: agent_user.into(),
            agent_password: agent_password.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// `POST /register`, authenticated with the shared agent-registration
    /// Basic-auth credential (not a per-agent token — the agent has none
    /// yet).
    pub async fn register(&self, hostname: Option<String>) -> AgentResult<RegisterResponse> {
        let body = RegisterRequest {
            hostname,
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            start_time: Some(chrono::Utc::now().to_rfc3339()),
        };
        let resp = self
            .http
            .post(self.url("/register"))
            .basic_auth(&self.agent_user, Some(&self.agent_password))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(AgentError::Registration(format!(
                "controller returned {}",
                resp.status()
            )));
        }
        resp.json().await.map_err(AgentError::Http)
    }

    /// `GET /config`, conditional on `etag` via `If-None-Match`.
    pub async fn poll_config(&self, api_token: &str, etag: Option<&str>) -> AgentResult<PollOutcome> {
        let mut req = self
            .http
            .get(self.url("/config"))
            .bearer_auth(api_token);
        if let Some(etag) = etag {
            req = req.header(reqwest::header::IF_NONE_MATCH, etag);
        }

        let resp = req.send().await?;
        match resp.status() {
            StatusCode::NOT_MODIFIED => Ok(PollOutcome::NotModified),
            status if status.is_success() => {
                let envelope: ConfigEnvelope = resp.json().await.map_err(AgentError::Http)?;
                Ok(PollOutcome::Updated(envelope))
            }
            status => Err(AgentError::Poll(format!("controller returned {status}"))),
        }
    }

    /// `POST /heartbeat`.
    pub async fn heartbeat(&self, api_token: &str, config_version: String) -> AgentResult<HeartbeatResponse> {
        let resp = self
            .http
            .post(self.url("/heartbeat"))
            .bearer_auth(api_token)
            .json(&HeartbeatRequest {
                config_version,
                status: "ok".to_string(),
            })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AgentError::Poll(format!(
                "heartbeat rejected: {}",
                resp.status()
            )));
        }
        resp.json().await.map_err(AgentError::Http)
    }
}

/// Client for pushing configuration down to the local worker process.
pub struct WorkerClient {
    http: Client,
    base_url: String,
}

impl WorkerClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> AgentResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AgentError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// `POST /config` on the worker, forwarding the controller's envelope
    /// config body verbatim.
    pub async fn forward_config(&self, config: &Value) -> AgentResult<()> {
        let resp = self
            .http
            .post(self.url("/config"))
            .json(config)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AgentError::Forward(format!(
                "worker returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    pub async fn healthy(&self) -> bool {
        self.http
            .get(self.url("/health"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn register_sends_basic_auth_and_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/register"))
            .and(header("authorization", "Basic YWdlbnQ6c2VjcmV0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "agent_id": "00000000-0000-0000-0000-000000000001",
                "api_token": "tok-abc",
                "poll_url": "/config",
                "poll_interval_seconds": 5
            })))
            .mount(&server)
            .await;

        let client = ControllerClient::new(server.uri(), "agent", "secret", Duration::from_secs(5)).unwrap();
        let reg = client.register(Some("host-1".to_string())).await.unwrap();
        assert_eq!(reg.api_token, "tok-abc");
        assert_eq!(reg.poll_interval_seconds, 5);
    }

    #[tokio::test]
    async fn poll_config_returns_not_modified_on_304() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/config"))
            .and(header("if-none-match", "etag-1"))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let client = ControllerClient::new(server.uri(), "agent", "secret", Duration::from_secs(5)).unwrap();
        let outcome = client.poll_config("tok", Some("etag-1")).await.unwrap();
        assert!(matches!(outcome, PollOutcome::NotModified));
    }

    #[tokio::test]
    async fn poll_config_returns_updated_envelope_on_200() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 1,
                "etag": "etag-2",
                "config": {"url": "https://example.com"},
                "poll_interval_seconds": 5
            })))
            .mount(&server)
            .await;

        let client = ControllerClient::new(server.uri(), "agent", "secret", Duration::from_secs(5)).unwrap();
        let outcome = client.poll_config("tok", None).await.unwrap();
        match outcome {
            PollOutcome::Updated(env) => assert_eq!(env.etag, "etag-2"),
            PollOutcome::NotModified => panic!("expected updated envelope"),
        }
    }

    #[tokio::test]
    async fn forward_config_propagates_worker_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/config"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = WorkerClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = client
            .forward_config(&serde_json::json!({"url": "https://example.com"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Forward(_)));
    }
}
