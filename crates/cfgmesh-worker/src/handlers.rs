//! HTTP handlers for the worker's request-handling surface (§4.3/§6).

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use cfgmesh_proto::{ConfigPayload, ConfigWriteResponse, HitResult, WorkerHealthResponse};

use crate::cell::{CellValue, ConfigCell};
use crate::error::WorkerError;

type HandlerResult<T> = Result<T, WorkerError>;

#[derive(Clone)]
pub struct WorkerState {
    cell: Arc<ConfigCell>,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl WorkerState {
    pub fn new(request_timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            cell: Arc::new(ConfigCell::new()),
            http,
            request_timeout,
        })
    }

    pub fn cell(&self) -> &ConfigCell {
        &self.cell
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfigUpdate {
    pub id: u64,
    pub etag: String,
    pub config: ConfigPayload,
}

// ─── POST /config ───────────────────────────────────────────────────────────

pub async fn write_config(
    State(state): State<WorkerState>,
    Json(body): Json<ConfigUpdate>,
) -> HandlerResult<Json<ConfigWriteResponse>> {
    if !body.config.is_valid() {
        return Err(WorkerError::Validation(
            "config.url must be a well-formed URL".to_string(),
        ));
    }

    state
        .cell
        .set(CellValue {
            id: body.id,
            etag: body.etag.clone(),
            config: body.config,
        })
        .await;

    tracing::info!(etag = %body.etag, id = body.id, "config cell updated");
    Ok(Json(ConfigWriteResponse { success: true }))
}

// ─── GET /hit ────────────────────────────────────────────────────────────────

pub async fn hit(State(state): State<WorkerState>) -> HandlerResult<Json<HitResult>> {
    let current = state.cell.get().await.ok_or(WorkerError::Unconfigured)?;

    let mut builder = state.http.get(&current.config.url);
    if let Some(proxy) = current.config.proxy.as_deref() {
        let proxy = reqwest::Proxy::all(proxy).map_err(WorkerError::Hit)?;
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(state.request_timeout)
            .build()
            .map_err(WorkerError::Hit)?;
        builder = client.get(&current.config.url);
    }

    let started = Instant::now();
    let resp = builder.send().await.map_err(WorkerError::Hit)?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    Ok(Json(HitResult {
        etag: current.etag.clone(),
        target_url: current.config.url.clone(),
        status: resp.status().as_u16(),
        elapsed_ms,
    }))
}

// ─── GET /health ─────────────────────────────────────────────────────────────

pub async fn health(State(state): State<WorkerState>) -> Json<WorkerHealthResponse> {
    let etag = state.cell.etag().await;
    Json(WorkerHealthResponse {
        configured: etag.is_some(),
        etag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_app() -> (axum::Router, WorkerState) {
        let state = WorkerState::new(Duration::from_secs(5)).expect("worker state");
        (crate::router(state.clone()), state)
    }

    #[tokio::test]
    async fn health_reports_unconfigured_before_first_write() {
        let (app, _state) = test_app().await;
        let req = Request::get("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let health: WorkerHealthResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(!health.configured);
    }

    #[tokio::test]
    async fn write_config_rejects_invalid_url() {
        let (app, _state) = test_app().await;
        let req = Request::post("/config")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"id":1,"etag":"e1","config":{"url":""}}"#))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn hit_returns_503_before_any_config() {
        let (app, _state) = test_app().await;
        let req = Request::get("/hit").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn write_config_then_hit_reaches_target() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (app, _state) = test_app().await;
        let body = serde_json::json!({
            "id": 1,
            "etag": "e1",
            "config": {"url": server.uri()}
        });
        let req = Request::post("/config")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let req = Request::get("/hit").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let result: HitResult = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(result.status, 200);
        assert_eq!(result.etag, "e1");
    }
}
