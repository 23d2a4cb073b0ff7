//! The agent's run loop: register once, then poll/forward/heartbeat on a
//! timer until asked to shut down.
//!
//! Grounded on `groblegark-coop::broker::client`'s retry-then-settle-into-
//! a-loop shape, adapted to use [`cfgmesh_retry::retry`] instead of a
//! hand-rolled backoff and to drive three concerns (poll, forward,
//! heartbeat) off one `tokio::time::interval` tick rather than a single
//! request/response cycle.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;

use cfgmesh_retry::{retry, RetryOutcome};

use crate::client::{ControllerClient, PollOutcome, WorkerClient};
use crate::config::AgentConfig;
use crate::error::{AgentError, AgentResult};
use crate::session::AgentSession;

pub struct Agent {
    config: AgentConfig,
    controller: ControllerClient,
    worker: WorkerClient,
    session: AgentSession,
}

impl Agent {
    pub fn new(config: AgentConfig) -> AgentResult<Self> {
        let timeout = Duration::from_secs(config.request_timeout);
        let controller = ControllerClient::new(
            config.controller_url.clone(),
            config.agent_user.clone(),
            config.agent_password.clone(),
            timeout,
        )?;
        let worker = WorkerClient::new(config.worker_url.clone(), timeout)?;
        Ok(Self {
            config,
            controller,
            worker,
            session: AgentSession::new(),
        })
    }

    pub fn session(&self) -> AgentSession {
        self.session.clone()
    }

    /// Registers with the controller, retrying with backoff until
    /// `shutdown` fires or retries are exhausted.
    pub async fn register(&self, shutdown: watch::Receiver<bool>) -> AgentResult<()> {
        let retry_config = self.config.registration_retry_config();
        let hostname = self.config.agent_hostname.clone();

        let result = retry(retry_config, shutdown, |attempt| {
            let hostname = hostname.clone();
            async move {
                tracing::info!(attempt, "attempting controller registration");
                self.controller.register(Some(hostname)).await
            }
        })
        .await;

        match result {
            Ok(reg) => {
                tracing::info!(agent_id = %reg.agent_id, "registered with controller");
                self.session
                    .set_identity(
                        reg.agent_id.to_string(),
                        reg.api_token,
                        reg.poll_url,
                        reg.poll_interval_seconds,
                    )
                    .await;
                Ok(())
            }
            Err(RetryOutcome::Exhausted(err)) => Err(err),
            Err(RetryOutcome::ShutDown) => Err(AgentError::Registration(
                "shut down before registration completed".to_string(),
            )),
        }
    }

    /// Runs the poll/forward/heartbeat loop until `shutdown` fires.
    /// Registration must have already succeeded (`register` was awaited).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }

            if let Err(err) = self.poll_and_forward(shutdown.clone()).await {
                tracing::warn!(error = %err, "poll/forward cycle failed");
            }

            if self.config.heartbeat_enabled {
                if let Err(err) = self.send_heartbeat().await {
                    tracing::warn!(error = %err, "heartbeat failed");
                }
            }

            let interval = self
                .session
                .poll_interval_seconds()
                .await
                .unwrap_or(self.config.poll_interval);

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn poll_and_forward(&self, shutdown: watch::Receiver<bool>) -> AgentResult<()> {
        let token = self
            .session
            .api_token()
            .await
            .ok_or_else(|| AgentError::Poll("agent is not registered".to_string()))?;
        let etag = self.session.current_etag().await;

        match self.controller.poll_config(&token, etag.as_deref()).await? {
            PollOutcome::NotModified => Ok(()),
            PollOutcome::Updated(envelope) => {
                let advanced = self
                    .session
                    .observe(
                        envelope.etag.clone(),
                        envelope.config.clone(),
                        envelope.poll_interval_seconds,
                    )
                    .await;
                if !advanced {
                    return Ok(());
                }

                if !envelope.config.is_valid() {
                    // No admin write has happened yet; the controller's
                    // bootstrap envelope carries an empty config. Nothing to
                    // push to the worker until a real one arrives.
                    tracing::debug!("bootstrap envelope has no config yet, skipping forward");
                    return Ok(());
                }

                // The worker's `/config` expects `{id, etag, config}`, not the
                // bare payload — forward the full envelope verbatim (§4.2.3).
                let body: Value = serde_json::to_value(&envelope)?;
                let retry_config = cfgmesh_retry::RetryConfig::forward(3);
                let result = retry(retry_config, shutdown, |attempt| {
                    let body = body.clone();
                    async move {
                        tracing::info!(attempt, etag = %envelope.etag, "forwarding config to worker");
                        self.worker.forward_config(&body).await
                    }
                })
                .await;

                match result {
                    Ok(()) => {
                        tracing::info!(etag = %envelope.etag, "config forwarded to worker");
                        Ok(())
                    }
                    Err(RetryOutcome::Exhausted(err)) => Err(err),
                    Err(RetryOutcome::ShutDown) => Ok(()),
                }
            }
        }
    }

    async fn send_heartbeat(&self) -> AgentResult<()> {
        let token = self
            .session
            .api_token()
            .await
            .ok_or_else(|| AgentError::Poll("agent is not registered".to_string()))?;
        let version = self.session.current_etag().await.unwrap_or_default();
        let resp = self.controller.heartbeat(&token, version).await?;
        tracing::debug!(latest = %resp.latest_config_version, "heartbeat acknowledged");
        Ok(())
    }
}
