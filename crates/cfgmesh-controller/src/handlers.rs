//! HTTP handlers for the controller's public surface (§6 of the spec).
//!
//! Grounded on the handler shape in `mikefaille-adk-rust/adk-studio/src/
//! server/handlers.rs` (State + Path/Json extractors, a small `ApiResult`
//! alias) generalized to this controller's auth layering and ETag protocol.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use cfgmesh_auth::AuditEntry;
use cfgmesh_proto::{
    AgentListResponse, AgentView, AuditEntryView, AuditQueryResponse, ConfigEnvelope,
    ConfigPayload, ConfigWriteResponse, HealthResponse, HeartbeatRequest,
    HeartbeatResponse, IntervalUpdateRequest, RegisterRequest, RegisterResponse, SuccessMessage,
    TokenRotateResponse,
};

use crate::auth::{AdminAuth, AgentBasicAuth, AgentIdentity};
use crate::error::ControllerError;
use crate::state::AppState;

type HandlerResult<T> = Result<T, ControllerError>;

fn agent_view(rec: &cfgmesh_auth::AgentRecord) -> AgentView {
    AgentView {
        agent_id: rec.id,
        agent_name: rec.agent_name.clone(),
        poll_interval_seconds: rec.poll_interval_seconds,
        last_heartbeat: rec.last_heartbeat,
        last_config_version: rec.last_config_version.clone(),
        created_at: rec.created_at,
        updated_at: rec.updated_at,
    }
}

// ─── GET /health ────────────────────────────────────────────────────────────

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

// ─── POST /register ─────────────────────────────────────────────────────────

pub async fn register(
    State(state): State<AppState>,
    _auth: AgentBasicAuth,
    Json(req): Json<RegisterRequest>,
) -> HandlerResult<Json<RegisterResponse>> {
    let hostname = req.hostname.unwrap_or_else(|| "unknown".to_string());
    let mut agents = state.agents().lock().await;
    let (record, token) = agents.register(hostname, None).await?;
    drop(agents);

    let mut audit = state.audit().lock().await;
    audit
        .append(AuditEntry::ok("agent", "agent.register").with_resource_id(record.id.to_string()))
        .await?;

    let poll_interval_seconds = state.effective_interval(record.poll_interval_seconds);
    Ok(Json(RegisterResponse {
        agent_id: record.id,
        api_token: token,
        poll_url: "/config".to_string(),
        poll_interval_seconds,
    }))
}

// ─── POST /config (admin write) ─────────────────────────────────────────────

pub async fn write_config(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Json(body): Json<serde_json::Value>,
) -> HandlerResult<Json<ConfigWriteResponse>> {
    let payload: ConfigPayload = serde_json::from_value(body.clone())
        .map_err(|e| ControllerError::Validation(format!("invalid config body: {e}")))?;
    if !payload.is_valid() {
        return Err(ControllerError::Validation(
            "config.url must be a well-formed URL".to_string(),
        ));
    }

    let mut configs = state.configs().lock().await;
    let row = configs.append(body).await?;
    drop(configs);

    state.publish(row.etag.clone(), None);

    let mut audit = state.audit().lock().await;
    audit
        .append(AuditEntry::ok("admin", "config.write").with_resource_id(row.id.to_string()))
        .await?;

    Ok(Json(ConfigWriteResponse { success: true }))
}

// ─── GET /config (conditional fetch) ────────────────────────────────────────

pub async fn read_config(
    State(state): State<AppState>,
    AgentIdentity(agent_id): AgentIdentity,
    headers: HeaderMap,
) -> HandlerResult<Response> {
    let configs = state.configs().lock().await;
    let Some(latest) = configs.latest() else {
        // No admin write has ever happened. Serve an empty payload rather
        // than an error — a fresh deployment is a valid boundary state.
        drop(configs);
        let agents = state.agents().lock().await;
        let interval = agents
            .get(agent_id)
            .and_then(|a| a.poll_interval_seconds);
        return Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "id": 0,
                "etag": "",
                "config": {},
                "poll_interval_seconds": state.effective_interval(interval),
            })),
        )
            .into_response());
    };

    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok());
    if if_none_match == Some(latest.etag.as_str()) {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let config: ConfigPayload = serde_json::from_value(latest.config.clone())
        .map_err(|e| ControllerError::Validation(format!("stored config invalid: {e}")))?;
    let id = latest.id;
    let etag = latest.etag.clone();
    drop(configs);

    let agents = state.agents().lock().await;
    let interval = agents.get(agent_id).and_then(|a| a.poll_interval_seconds);
    let poll_interval_seconds = state.effective_interval(interval);

    let envelope = ConfigEnvelope {
        id,
        etag: etag.clone(),
        config,
        poll_interval_seconds: Some(poll_interval_seconds),
    };

    let mut resp = (StatusCode::OK, Json(envelope)).into_response();
    resp.headers_mut().insert(
        header::ETAG,
        header::HeaderValue::from_str(&etag).unwrap_or_else(|_| header::HeaderValue::from_static("")),
    );
    Ok(resp)
}

// ─── POST /heartbeat ─────────────────────────────────────────────────────────

pub async fn heartbeat(
    State(state): State<AppState>,
    AgentIdentity(agent_id): AgentIdentity,
    Json(req): Json<HeartbeatRequest>,
) -> HandlerResult<Json<HeartbeatResponse>> {
    let mut agents = state.agents().lock().await;
    agents
        .record_heartbeat(agent_id, req.config_version)
        .await?;
    drop(agents);

    let configs = state.configs().lock().await;
    let latest_config_version = configs
        .latest()
        .map(|row| row.etag.clone())
        .unwrap_or_default();

    Ok(Json(HeartbeatResponse {
        latest_config_version,
        received_at: chrono::Utc::now(),
    }))
}

// ─── Admin agent CRUD ────────────────────────────────────────────────────────

pub async fn list_agents(
    State(state): State<AppState>,
    _auth: AdminAuth,
) -> Json<AgentListResponse> {
    let agents = state.agents().lock().await;
    let views: Vec<AgentView> = agents.list().into_iter().map(agent_view).collect();
    Json(AgentListResponse {
        total: views.len(),
        agents: views,
    })
}

pub async fn get_agent(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(id): Path<Uuid>,
) -> HandlerResult<Json<AgentView>> {
    let agents = state.agents().lock().await;
    let rec = agents.get(id).ok_or(ControllerError::UnknownAgent)?;
    Ok(Json(agent_view(rec)))
}

pub async fn update_interval(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(id): Path<Uuid>,
    Json(req): Json<IntervalUpdateRequest>,
) -> HandlerResult<Json<SuccessMessage>> {
    let mut agents = state.agents().lock().await;
    agents
        .set_interval(id, req.poll_interval_seconds)
        .await
        .map_err(|_| ControllerError::UnknownAgent)?;
    drop(agents);

    let mut audit = state.audit().lock().await;
    audit
        .append(
            AuditEntry::ok("admin", "agent.interval_update").with_resource_id(id.to_string()),
        )
        .await?;

    Ok(Json(SuccessMessage {
        success: true,
        message: "poll interval updated".to_string(),
    }))
}

pub async fn rotate_token(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(id): Path<Uuid>,
) -> HandlerResult<Json<TokenRotateResponse>> {
    let mut agents = state.agents().lock().await;
    let token = agents
        .rotate_token(id)
        .await
        .map_err(|_| ControllerError::UnknownAgent)?;
    drop(agents);

    let mut audit = state.audit().lock().await;
    audit
        .append(AuditEntry::ok("admin", "agent.token_rotate").with_resource_id(id.to_string()))
        .await?;

    Ok(Json(TokenRotateResponse {
        agent_id: id,
        api_token: token,
    }))
}

pub async fn delete_agent(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(id): Path<Uuid>,
) -> HandlerResult<Json<SuccessMessage>> {
    let mut agents = state.agents().lock().await;
    agents.delete(id).await.map_err(|_| ControllerError::UnknownAgent)?;
    drop(agents);

    let mut audit = state.audit().lock().await;
    audit
        .append(AuditEntry::ok("admin", "agent.delete").with_resource_id(id.to_string()))
        .await?;

    Ok(Json(SuccessMessage {
        success: true,
        message: "agent deleted".to_string(),
    }))
}

// ─── GET /audit ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub actor: Option<String>,
    pub action: Option<String>,
    pub limit: Option<usize>,
}

fn audit_view(e: &AuditEntry) -> AuditEntryView {
    AuditEntryView {
        id: e.id,
        timestamp: e.timestamp,
        actor: e.actor.clone(),
        action: e.action.clone(),
        resource_id: e.resource_id.clone(),
        result: e.result.clone(),
        detail: e.detail.clone(),
    }
}

pub async fn query_audit(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Query(q): Query<AuditQuery>,
) -> Json<AuditQueryResponse> {
    let audit = state.audit().lock().await;
    let entries = audit
        .query(q.actor.as_deref(), q.action.as_deref(), q.limit)
        .into_iter()
        .map(audit_view)
        .collect();
    Json(AuditQueryResponse { entries })
}

// ─── GET /config/events (optional push hint) ────────────────────────────────

/// Server-Sent Events stream of change notifications. Strictly a latency
/// optimization over polling (§9): an agent that never connects here still
/// converges correctly via `GET /config`, just later. Grounded on the SSE
/// generator shape in `mikefaille-adk-rust/adk-studio/src/server/handlers.rs`
/// (`async_stream::stream!` yielding `axum::response::sse::Event`s).
pub async fn config_events(
    State(state): State<AppState>,
    _auth: AgentIdentity,
) -> axum::response::Sse<impl futures_util::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>>
{
    use axum::response::sse::Event;

    let mut rx = state.subscribe();
    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(notification) => {
                    let data = serde_json::to_string(&notification).unwrap_or_default();
                    yield Ok(Event::default().event("config_changed").data(data));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    axum::response::Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::default())
}
