//! Background availability tracking for external backends.
//!
//! A [`HealthMonitor`] owns a tokio task that probes one backend and retries
//! failures with bounded exponential backoff. Request paths only read the
//! resulting flag; they never wait on a backend coming back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{with_timeout, BackendError};

#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;
    async fn probe(&self) -> Result<(), BackendError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Consecutive failures after which retries settle at `max`.
    pub max_attempts: u32,
    /// Deadline for a single probe; an elapsed probe counts as a failure.
    pub probe_timeout: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 10,
            probe_timeout: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (0-based), capped at `max`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(63) as i32);
        let millis = (self.initial.as_millis() as f64 * factor).min(self.max.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }
}

pub struct HealthMonitor {
    name: String,
    available: Arc<AtomicBool>,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl HealthMonitor {
    /// Start probing `probe` every `interval` while healthy. Availability is
    /// optimistic until the first probe completes. A failing backend is
    /// retried with backoff until `token` is cancelled; it is never given up.
    pub fn spawn(probe: Arc<dyn HealthProbe>, policy: BackoffPolicy, interval: Duration, token: CancellationToken) -> Self {
        let name = probe.name().to_string();
        let available = Arc::new(AtomicBool::new(true));
        let flag = available.clone();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut failures: u32 = 0;
            loop {
                let outcome = tokio::select! {
                    biased;
                    _ = task_token.cancelled() => return,
                    res = with_timeout(policy.probe_timeout, probe.probe()) => res,
                };
                let wait = match outcome {
                    Ok(()) => {
                        if !flag.swap(true, Ordering::SeqCst) { info!(backend = probe.name(), "backend recovered"); }
                        failures = 0;
                        interval
                    }
                    Err(e) => {
                        flag.store(false, Ordering::SeqCst);
                        failures = failures.saturating_add(1);
                        if failures == policy.max_attempts {
                            warn!(backend = probe.name(), attempts = failures, error = %e, "backend still down, probing at the capped delay");
                        } else {
                            debug!(backend = probe.name(), attempt = failures, error = %e, "probe failed");
                        }
                        if failures >= policy.max_attempts { policy.max } else { policy.delay_for(failures - 1) }
                    }
                };
                tokio::select! {
                    _ = task_token.cancelled() => return,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        });
        Self { name, available, token, handle }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn is_available(&self) -> bool { self.available.load(Ordering::SeqCst) }

    /// Whether the probing task has exited, which only cancellation causes.
    pub fn is_finished(&self) -> bool { self.handle.is_finished() }

    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}
