use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ragsearch_core::health::{BackoffPolicy, HealthMonitor, HealthProbe};
use ragsearch_core::BackendError;
use tokio_util::sync::CancellationToken;

struct ScriptedProbe { up: AtomicBool, calls: AtomicUsize }

#[async_trait]
impl HealthProbe for ScriptedProbe {
    fn name(&self) -> &str { "scripted" }
    async fn probe(&self) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.up.load(Ordering::SeqCst) { Ok(()) } else { Err(BackendError::Unavailable("down".into())) }
    }
}

fn fast_policy(max_attempts: u32) -> BackoffPolicy {
    BackoffPolicy { initial: Duration::from_millis(5), max: Duration::from_millis(20), multiplier: 2.0, max_attempts, probe_timeout: Duration::from_millis(50) }
}

#[test]
fn backoff_grows_and_caps() {
    let p = BackoffPolicy { initial: Duration::from_millis(100), max: Duration::from_millis(1000), multiplier: 2.0, max_attempts: 5, probe_timeout: Duration::from_secs(1) };
    assert_eq!(p.delay_for(0), Duration::from_millis(100));
    assert_eq!(p.delay_for(1), Duration::from_millis(200));
    assert_eq!(p.delay_for(3), Duration::from_millis(800));
    assert_eq!(p.delay_for(4), Duration::from_millis(1000));
    assert_eq!(p.delay_for(40), Duration::from_millis(1000));
}

#[tokio::test]
async fn monitor_keeps_probing_after_max_attempts() {
    let probe = Arc::new(ScriptedProbe { up: AtomicBool::new(false), calls: AtomicUsize::new(0) });
    let monitor = HealthMonitor::spawn(probe.clone(), fast_policy(3), Duration::from_millis(5), CancellationToken::new());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!monitor.is_available());
    assert!(!monitor.is_finished());
    assert!(probe.calls.load(Ordering::SeqCst) > 3);

    probe.up.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(monitor.is_available(), "a long outage must not disable the backend for good");
    monitor.shutdown().await;
}

/// Never answers.
struct HungProbe;

#[async_trait]
impl HealthProbe for HungProbe {
    fn name(&self) -> &str { "hung" }
    async fn probe(&self) -> Result<(), BackendError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

#[tokio::test]
async fn hung_health_check_times_out_and_shutdown_returns() {
    let monitor = HealthMonitor::spawn(Arc::new(HungProbe), fast_policy(3), Duration::from_millis(5), CancellationToken::new());
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!monitor.is_available());
    let stopped = tokio::time::timeout(Duration::from_secs(2), monitor.shutdown()).await;
    assert!(stopped.is_ok());
}

#[tokio::test]
async fn recovering_backend_flips_back_to_available() {
    let probe = Arc::new(ScriptedProbe { up: AtomicBool::new(false), calls: AtomicUsize::new(0) });
    let monitor = HealthMonitor::spawn(probe.clone(), fast_policy(50), Duration::from_millis(5), CancellationToken::new());
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!monitor.is_available());
    probe.up.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(monitor.is_available());
    monitor.shutdown().await;
}

#[tokio::test]
async fn cancellation_stops_probing() {
    let probe = Arc::new(ScriptedProbe { up: AtomicBool::new(true), calls: AtomicUsize::new(0) });
    let token = CancellationToken::new();
    let monitor = HealthMonitor::spawn(probe.clone(), fast_policy(3), Duration::from_millis(5), token.clone());
    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(monitor.is_finished());
    let calls = probe.calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(probe.calls.load(Ordering::SeqCst), calls);
}
