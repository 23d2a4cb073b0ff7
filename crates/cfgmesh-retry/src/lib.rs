//! A reusable exponential-backoff retry loop.
//!
//! Used by the agent for both registration retries (no jitter) and
//! forward-to-worker retries (jittered, tighter cap). The policy is data
//! (`RetryConfig`); the loop itself is generic over any fallible async
//! operation and races its sleeps against a shutdown signal so a process
//! asked to stop never sits out a full backoff window.

#![forbid(unsafe_code)]

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;

/// Backoff policy: `delay(n) = min(initial * multiplier^(n-1), cap)`,
/// optionally jittered by ±25%, for attempt `n` starting at 1.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial: Duration,
    pub cap: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl RetryConfig {
    /// Registration policy: 1s initial, 30s cap, 2x multiplier, no jitter,
    /// 5 retries by default.
    pub fn registration(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Forward-to-worker policy: same backoff curve as registration, with
    /// ±25% jitter to avoid synchronized retries across a fleet of agents.
    pub fn forward(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// The un-jittered delay scheduled before retry attempt `n` (n >= 1).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let scaled = self.initial.as_secs_f64() * self.multiplier.powi(attempt as i32 - 1);
        Duration::from_secs_f64(scaled.min(self.cap.as_secs_f64()))
    }

    /// The delay actually slept before retry attempt `n`, with jitter
    /// applied if configured. Always within `[0, cap]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if !self.jitter {
            return base;
        }
        jittered(base, self.cap)
    }
}

fn jittered(base: Duration, cap: Duration) -> Duration {
    let base_secs = base.as_secs_f64();
    let spread = base_secs * 0.25;
    let low = (base_secs - spread).max(0.0);
    let high = (base_secs + spread).min(cap.as_secs_f64());
    if high <= low {
        return Duration::from_secs_f64(low);
    }
    let jittered = rand::thread_rng().gen_range(low..=high);
    Duration::from_secs_f64(jittered)
}

/// Why a `retry` call ended without a success.
#[derive(Debug)]
pub enum RetryOutcome<E> {
    /// All attempts failed; carries the last error observed.
    Exhausted(E),
    /// A shutdown signal fired mid-retry; no error to report.
    ShutDown,
}

/// Runs `op` up to `config.max_retries + 1` times (the initial attempt plus
/// `max_retries` retries), sleeping `config.delay_for(n)` between attempts.
/// Each sleep races against `shutdown` becoming `true`; if shutdown wins,
/// the loop aborts immediately without sleeping out the remainder.
pub async fn retry<F, Fut, T, E>(
    config: RetryConfig,
    mut shutdown: watch::Receiver<bool>,
    mut op: F,
) -> Result<T, RetryOutcome<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 1;
    loop {
        if *shutdown.borrow() {
            return Err(RetryOutcome::ShutDown);
        }
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt > config.max_retries {
                    return Err(RetryOutcome::Exhausted(err));
                }
                let delay = config.delay_for(attempt);
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "retry attempt failed, backing off");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return Err(RetryOutcome::ShutDown);
                        }
                    }
                }
                attempt += 1;
            }
        }
    }
}
