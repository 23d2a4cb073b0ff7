//! Test-only harness shared by the `cfgmesh-tests` integration suite
//! (`tests/*.rs`): boots real `cfgmesh-controller`/`cfgmesh-worker` axum
//! routers on ephemeral loopback ports, so the scenarios in `tests/e2e.rs`
//! exercise the same HTTP/JSON wire path a real deployment would rather
//! than calling internal functions directly.

use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::task::JoinHandle;

use cfgmesh_controller::config::ControllerConfig;
use cfgmesh_controller::AppState;
use cfgmesh_worker::handlers::WorkerState;

/// A controller test-config for `admin`/`agent` user pair, rooted at a
/// caller-owned temp directory. `poll_interval` is the global default
/// (seconds) new agents get unless overridden.
pub fn test_controller_config(state_dir: &Path, poll_interval: u64) -> ControllerConfig {
    let mut cfg = ControllerConfig::default();
    cfg.state_dir = state_dir.to_path_buf();
    cfg.poll_interval = poll_interval;
    cfg.admin_user = "admin".to_string();
    cfg.admin_password = "adminpass".to_string();
    cfg.agent_user = "agent".to_string();
    cfg.agent_password = "agentpass".to_string();
    cfg
}

pub struct SpawnedController {
    pub base_url: String,
    pub state: AppState,
    handle: JoinHandle<()>,
}

impl Drop for SpawnedController {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Binds an ephemeral loopback port and serves the real controller router
/// on it in a background task.
pub async fn spawn_controller(cfg: ControllerConfig) -> SpawnedController {
    let state = AppState::load(cfg).await.expect("load controller state");
    let app = cfgmesh_controller::router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind controller listener");
    let addr = listener.local_addr().expect("controller local addr");
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    SpawnedController {
        base_url: format!("http://{addr}"),
        state,
        handle,
    }
}

pub struct SpawnedWorker {
    pub base_url: String,
    pub state: WorkerState,
    handle: JoinHandle<()>,
}

impl Drop for SpawnedWorker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Binds an ephemeral loopback port and serves the real worker router on
/// it in a background task.
pub async fn spawn_worker(request_timeout: Duration) -> SpawnedWorker {
    let state = WorkerState::new(request_timeout).expect("worker state");
    let app = cfgmesh_worker::router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind worker listener");
    let addr = listener.local_addr().expect("worker local addr");
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    SpawnedWorker {
        base_url: format!("http://{addr}"),
        state,
        handle,
    }
}

pub fn basic_auth_header(user: &str, pass: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{user}:{pass}")))
}

/// Polls `check` every `interval` until it returns `true` or `timeout`
/// elapses, returning whether it converged in time. Used in place of a
/// fixed sleep so tests run as fast as the system under test actually
/// converges, with an upper bound matching the scenario's stated latency
/// budget.
pub async fn wait_until<F, Fut>(timeout: Duration, interval: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}
