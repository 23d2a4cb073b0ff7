//! Wire types for the cfgmesh configuration control plane.
//!
//! Defines the JSON envelopes exchanged between the Controller, the Agent,
//! and the Worker: registration, the versioned configuration envelope,
//! heartbeats, agent administration, and the audit query surface.

#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Configuration payload ────────────────────────────────────────────────────

/// The canonical configuration envelope: a target URL and an optional proxy.
///
/// This is the one shape the controller, agent, and worker all agree on
/// (the source drifted between `{url, proxy}` and `{target_url, headers,
/// timeout}` — this implementation standardizes on the former end to end).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigPayload {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Any additional fields the operator included; preserved but not
    /// interpreted by any component.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ConfigPayload {
    /// `true` if `url` parses as a well-formed URL.
    pub fn is_valid(&self) -> bool {
        !self.url.is_empty() && url::Url::parse(&self.url).is_ok()
    }
}

/// A single stored configuration version, as returned by `GET /config` and
/// forwarded verbatim by the agent to the worker's `POST /config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEnvelope {
    pub id: u64,
    pub etag: String,
    pub config: ConfigPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_seconds: Option<u64>,
}

// ─── Registration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub agent_id: Uuid,
    pub api_token: String,
    pub poll_url: String,
    pub poll_interval_seconds: u64,
}

// ─── Config write (admin) ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWriteResponse {
    pub success: bool,
}

// ─── Heartbeat ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub config_version: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub latest_config_version: String,
    pub received_at: DateTime<Utc>,
}

// ─── Agent administration ──────────────────────────────────────────────────────

/// Public view of a registered agent (never includes the token itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentView {
    pub agent_id: Uuid,
    pub agent_name: String,
    pub poll_interval_seconds: Option<u64>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_config_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentListResponse {
    pub agents: Vec<AgentView>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalUpdateRequest {
    pub poll_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRotateResponse {
    pub agent_id: Uuid,
    pub api_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessMessage {
    pub success: bool,
    pub message: String,
}

// ─── Audit ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntryView {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub resource_id: Option<String>,
    pub result: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditQueryResponse {
    pub entries: Vec<AuditEntryView>,
}

// ─── Change notification (push hint) ───────────────────────────────────────────

/// Fire-and-forget hint that a new configuration is available. Carried over
/// the controller's in-process broadcast channel and, optionally, streamed
/// to agents as Server-Sent Events on `GET /config/events`. Never a source
/// of truth — see the polling contract in the agent crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub etag: String,
    pub correlation_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<Uuid>,
}

// ─── Health ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHealthResponse {
    pub configured: bool,
    pub etag: Option<String>,
}

// ─── Worker request-handling endpoint ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitResult {
    pub etag: String,
    pub target_url: String,
    pub status: u16,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_payload_valid_url_accepted() {
        let p = ConfigPayload {
            url: "https://example.com/api".to_string(),
            proxy: None,
            extra: Default::default(),
        };
        assert!(p.is_valid());
    }

    #[test]
    fn config_payload_empty_url_rejected() {
        let p = ConfigPayload {
            url: String::new(),
            proxy: None,
            extra: Default::default(),
        };
        assert!(!p.is_valid());
    }

    #[test]
    fn config_payload_malformed_url_rejected() {
        let p = ConfigPayload {
            url: "not a url".to_string(),
            proxy: None,
            extra: Default::default(),
        };
        assert!(!p.is_valid());
    }

    #[test]
    fn config_payload_round_trips_extra_fields() {
        let raw = r#"{"url":"https://example.com","proxy":"http://p:8080","note":"keep me"}"#;
        let p: ConfigPayload = serde_json::from_str(raw).expect("parse");
        assert_eq!(p.proxy.as_deref(), Some("http://p:8080"));
        assert_eq!(p.extra.get("note").and_then(|v| v.as_str()), Some("keep me"));
        let back = serde_json::to_string(&p).expect("serialize");
        assert!(back.contains("\"note\":\"keep me\""));
    }

    #[test]
    fn config_envelope_omits_poll_interval_when_absent() {
        let env = ConfigEnvelope {
            id: 1,
            etag: "abc".to_string(),
            config: ConfigPayload {
                url: "https://example.com".to_string(),
                proxy: None,
                extra: Default::default(),
            },
            poll_interval_seconds: None,
        };
        let s = serde_json::to_string(&env).expect("serialize");
        assert!(!s.contains("poll_interval_seconds"));
    }

    #[test]
    fn health_response_default_is_healthy() {
        assert_eq!(HealthResponse::default().status, "healthy");
    }
}
