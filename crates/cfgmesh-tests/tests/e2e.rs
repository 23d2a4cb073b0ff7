//! End-to-end scenarios from the spec's §8, exercised against real
//! `cfgmesh-controller`/`cfgmesh-worker` axum routers bound to ephemeral
//! loopback ports plus, where a scenario calls for an unreliable peer, a
//! small hand-rolled flaky stand-in server.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use reqwest::header;
use tokio::sync::watch;

use cfgmesh_agent::client::WorkerClient;
use cfgmesh_agent::{Agent, AgentConfig};
use cfgmesh_retry::{retry, RetryConfig};
use cfgmesh_tests::{basic_auth_header, spawn_controller, spawn_worker, test_controller_config, wait_until};

/// Scenario 1: fresh bring-up. An agent registers, an admin writes a
/// configuration, and within the latency budget the worker's cell reflects
/// it — with no component talking to any other except over real HTTP.
#[tokio::test]
async fn fresh_bring_up_converges_worker_cell() {
    let dir = tempfile::tempdir().expect("tempdir");
    let controller = spawn_controller(test_controller_config(dir.path(), 5)).await;
    let worker = spawn_worker(Duration::from_secs(5)).await;

    let agent_config = AgentConfig {
        controller_url: controller.base_url.clone(),
        worker_url: worker.base_url.clone(),
        poll_interval: 1,
        request_timeout: 5,
        agent_user: "agent".to_string(),
        agent_password: "agentpass".to_string(),
        registration_max_retries: 3,
        registration_initial_backoff: 1,
        registration_max_backoff: 5,
        registration_backoff_multiplier: 2.0,
        agent_hostname: "test-host".to_string(),
        heartbeat_enabled: false,
    };
    let agent = Agent::new(agent_config).expect("construct agent");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    agent
        .register(shutdown_rx.clone())
        .await
        .expect("agent registers");

    let run_handle = tokio::spawn({
        let rx = shutdown_rx.clone();
        async move { agent.run(rx).await }
    });

    let http = reqwest::Client::new();
    let resp = http
        .post(format!("{}/config", controller.base_url))
        .header(
            header::AUTHORIZATION,
            basic_auth_header("admin", "adminpass"),
        )
        .json(&serde_json::json!({"url": "https://example.com/api"}))
        .send()
        .await
        .expect("admin write");
    assert_eq!(resp.status(), StatusCode::OK);

    let converged = wait_until(Duration::from_secs(5), Duration::from_millis(100), || async {
        worker
            .state
            .cell()
            .get()
            .await
            .is_some_and(|cell| cell.config.url == "https://example.com/api")
    })
    .await;
    assert!(converged, "worker cell did not converge within the latency budget");

    let _ = shutdown_tx.send(true);
    run_handle.abort();
}

/// Scenario 2: ETag reuse. Two admin writes of byte-identical bodies each
/// mint a distinct ETag.
#[tokio::test]
async fn etag_reuse_mints_distinct_etags_each_write() {
    let dir = tempfile::tempdir().expect("tempdir");
    let controller = spawn_controller(test_controller_config(dir.path(), 5)).await;
    let http = reqwest::Client::new();

    let reg = register_agent(&http, &controller.base_url).await;

    let body = serde_json::json!({"url": "https://example.com/api"});
    for _ in 0..2 {
        let resp = http
            .post(format!("{}/config", controller.base_url))
            .header(
                header::AUTHORIZATION,
                basic_auth_header("admin", "adminpass"),
            )
            .json(&body)
            .send()
            .await
            .expect("admin write");
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let etag_after_first_read = get_config_etag(&http, &controller.base_url, &reg.api_token).await;
    // A third identical write mints a third, still-distinct ETag.
    let resp = http
        .post(format!("{}/config", controller.base_url))
        .header(
            header::AUTHORIZATION,
            basic_auth_header("admin", "adminpass"),
        )
        .json(&body)
        .send()
        .await
        .expect("admin write");
    assert_eq!(resp.status(), StatusCode::OK);
    let etag_after_second_read = get_config_etag(&http, &controller.base_url, &reg.api_token).await;

    assert_ne!(etag_after_first_read, etag_after_second_read);
}

/// Scenario 3: interval change. An admin override takes effect on the
/// agent's very next poll.
#[tokio::test]
async fn interval_change_is_reflected_on_next_poll() {
    let dir = tempfile::tempdir().expect("tempdir");
    let controller = spawn_controller(test_controller_config(dir.path(), 5)).await;
    let http = reqwest::Client::new();
    let reg = register_agent(&http, &controller.base_url).await;
    assert_eq!(reg.poll_interval_seconds, 5);

    let resp = http
        .put(format!("{}/agents/{}/interval", controller.base_url, reg.agent_id))
        .header(
            header::AUTHORIZATION,
            basic_auth_header("admin", "adminpass"),
        )
        .json(&serde_json::json!({"poll_interval_seconds": 2}))
        .send()
        .await
        .expect("interval update");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = http
        .get(format!("{}/config", controller.base_url))
        .bearer_auth(&reg.api_token)
        .send()
        .await
        .expect("poll config");
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.expect("json body");
    assert_eq!(body["poll_interval_seconds"], 2);
}

/// Scenario 4: token rotation invalidates the previous token immediately.
#[tokio::test]
async fn token_rotation_invalidates_old_token() {
    let dir = tempfile::tempdir().expect("tempdir");
    let controller = spawn_controller(test_controller_config(dir.path(), 5)).await;
    let http = reqwest::Client::new();
    let reg = register_agent(&http, &controller.base_url).await;

    let resp = http
        .post(format!(
            "{}/agents/{}/token/rotate",
            controller.base_url, reg.agent_id
        ))
        .header(
            header::AUTHORIZATION,
            basic_auth_header("admin", "adminpass"),
        )
        .send()
        .await
        .expect("rotate token");
    assert_eq!(resp.status(), StatusCode::OK);
    let rotated: serde_json::Value = resp.json().await.expect("rotate body");
    let new_token = rotated["api_token"].as_str().expect("new token").to_string();

    let resp = http
        .get(format!("{}/config", controller.base_url))
        .bearer_auth(&reg.api_token)
        .send()
        .await
        .expect("old token poll");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = http
        .get(format!("{}/config", controller.base_url))
        .bearer_auth(&new_token)
        .send()
        .await
        .expect("new token poll");
    assert!(resp.status() == StatusCode::OK || resp.status() == StatusCode::NOT_MODIFIED);
}

/// Scenario 5: transient worker outage. The agent's forward-to-worker path
/// retries with backoff and succeeds once the worker recovers within the
/// retry budget. Uses the real `WorkerClient` and `cfgmesh_retry::retry`
/// against a stand-in server that fails its first two requests, with a
/// compressed backoff curve so the test doesn't spend real wall-clock
/// seconds sleeping out the spec's 1s/2s/4s schedule.
#[tokio::test]
async fn transient_worker_outage_recovers_within_retry_budget() {
    let counter = Arc::new(AtomicU32::new(0));
    let app = Router::new()
        .route("/config", post(flaky_config))
        .with_state(counter.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind flaky worker");
    let addr = listener.local_addr().expect("flaky worker addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let client = WorkerClient::new(format!("http://{addr}"), Duration::from_secs(2)).expect("worker client");
    let retry_config = RetryConfig {
        max_retries: 3,
        initial: Duration::from_millis(20),
        cap: Duration::from_millis(200),
        multiplier: 2.0,
        jitter: true,
    };
    let (_tx, shutdown_rx) = watch::channel(false);
    let body = serde_json::json!({"url": "https://example.com"});
    let result = retry(retry_config, shutdown_rx, |_attempt| {
        let body = body.clone();
        let client = &client;
        async move { client.forward_config(&body).await }
    })
    .await;

    assert!(result.is_ok(), "forward should eventually succeed");
    assert_eq!(counter.load(Ordering::SeqCst), 3, "worker should see exactly 3 attempts");
}

async fn flaky_config(State(counter): State<Arc<AtomicU32>>, _body: Json<serde_json::Value>) -> impl IntoResponse {
    let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
    if attempt < 3 {
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    } else {
        (StatusCode::OK, Json(serde_json::json!({"success": true}))).into_response()
    }
}

/// Scenario 6: registration storm. The controller is unreachable (here:
/// returns 503) for the agent's first two attempts; registration still
/// succeeds without operator intervention once it recovers, via the real
/// `Agent::register` retry path.
#[tokio::test]
async fn registration_survives_controller_unavailable_at_start() {
    let counter = Arc::new(AtomicU32::new(0));
    let app = Router::new()
        .route("/register", post(flaky_register))
        .with_state(counter.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind flaky controller");
    let addr = listener.local_addr().expect("flaky controller addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let agent_config = AgentConfig {
        controller_url: format!("http://{addr}"),
        worker_url: "http://127.0.0.1:1".to_string(),
        poll_interval: 5,
        request_timeout: 2,
        agent_user: "agent".to_string(),
        agent_password: "agentpass".to_string(),
        registration_max_retries: 5,
        registration_initial_backoff: 0,
        registration_max_backoff: 0,
        registration_backoff_multiplier: 2.0,
        agent_hostname: "test-host".to_string(),
        heartbeat_enabled: false,
    };
    let agent = Agent::new(agent_config).expect("construct agent");
    let (_tx, shutdown_rx) = watch::channel(false);
    agent
        .register(shutdown_rx)
        .await
        .expect("registration eventually succeeds");

    assert_eq!(counter.load(Ordering::SeqCst), 3, "controller should see exactly 3 attempts");
}

async fn flaky_register(
    State(counter): State<Arc<AtomicU32>>,
    _body: Json<serde_json::Value>,
) -> impl IntoResponse {
    let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
    if attempt < 3 {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    } else {
        Json(serde_json::json!({
            "agent_id": "11111111-1111-1111-1111-111111111111",
            "api_token": "tok-recovered",
            "poll_url": "/config",
            "poll_interval_seconds": 5
        }))
        .into_response()
    }
}

struct Registered {
    agent_id: String,
    api_token: String,
    poll_interval_seconds: u64,
}

async fn register_agent(http: &reqwest::Client, controller_base_url: &str) -> Registered {
    let resp = http
        .post(format!("{controller_base_url}/register"))
        .header(
            header::AUTHORIZATION,
            basic_auth_header("agent", "agentpass"),
        )
        .json(&serde_json::json!({"hostname": "test-host"}))
        .send()
        .await
        .expect("register");
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.expect("register body");
    Registered {
        agent_id: body["agent_id"].as_str().expect("agent_id").to_string(),
        api_token: body["api_token"].as_str().expect("api_token").to_string(),
        poll_interval_seconds: body["poll_interval_seconds"].as_u64().expect("poll_interval_seconds"),
    }
}

async fn get_config_etag(http: &reqwest::Client, controller_base_url: &str, token: &str) -> String {
    let resp = http
        .get(format!("{controller_base_url}/config"))
        .bearer_auth(token)
        .send()
        .await
        .expect("poll config");
    assert_eq!(resp.status(), StatusCode::OK);
    resp.headers()
        .get(header::ETAG)
        .and_then(|v| v.to_str().ok())
        .expect("etag header")
        .to_string()
}
