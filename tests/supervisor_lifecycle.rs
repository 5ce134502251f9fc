//! Supervisor lifecycle tests.
//!
//! Drives real child processes (`/bin/sh`) through the start/stop/exit
//! paths and checks the registry reflects each transition. Unix-only: the
//! scripts and signal delivery assume a POSIX shell.

#![cfg(unix)]

use std::path::PathBuf;
use std::time::Duration;

use rig_supervisor::supervisor::{
    Lifecycle, SessionKey, StartError, StartRequest, Supervisor,
};

fn sh() -> PathBuf {
    PathBuf::from("/bin/sh")
}

fn request(key: &SessionKey, script: &str) -> StartRequest {
    StartRequest {
        key: key.clone(),
        binary: sh(),
        args: vec!["-c".to_string(), script.to_string()],
        cwd: None,
        identity: None,
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
async fn wait_until(cond: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    cond()
}

// =============================================================================
// Start / stop / restart
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn start_stop_restart_cycle() {
    let supervisor = Supervisor::new();
    let key = SessionKey::miner("monero", "testnet");
    assert!(!supervisor.is_running(&key));
    assert!(supervisor.status(&key).is_none());

    supervisor.start(request(&key, "sleep 30")).unwrap();
    assert!(supervisor.is_running(&key));
    let record = supervisor.status(&key).unwrap();
    assert_eq!(record.state, Lifecycle::Running);
    assert!(record.pid.is_some());
    assert!(record.metrics.active);

    // Same key again without a stop: rejected, no second process.
    let err = supervisor.start(request(&key, "sleep 30")).unwrap_err();
    assert!(matches!(err, StartError::AlreadyRunning(_)));

    let stopped = supervisor.stop(&key).unwrap();
    assert_eq!(stopped.state, Lifecycle::Stopped);
    assert!(!stopped.metrics.active);
    assert!(!supervisor.is_running(&key));
    assert!(supervisor.status(&key).is_none());

    // Immediate restart under the same key is allowed and starts clean.
    supervisor.start(request(&key, "sleep 30")).unwrap();
    let fresh = supervisor.status(&key).unwrap();
    assert_eq!(fresh.metrics.hashrate, 0.0);
    assert_eq!(fresh.metrics.accepted, 0);
    assert!(!fresh.metrics.synced);
    let _ = supervisor.stop(&key);
}

#[tokio::test(flavor = "multi_thread")]
async fn self_exit_transitions_to_exited() {
    let supervisor = Supervisor::new();
    let key = SessionKey::node("quai", "testnet");
    supervisor.start(request(&key, "exit 7")).unwrap();

    assert!(wait_until(|| !supervisor.is_running(&key), Duration::from_secs(5)).await);
    let record = supervisor.status(&key).unwrap();
    assert_eq!(record.state, Lifecycle::Exited);
    assert_eq!(record.exit_code, Some(7));
    assert!(!record.metrics.active);

    // The terminal record does not block a new start.
    supervisor.start(request(&key, "sleep 30")).unwrap();
    assert!(supervisor.is_running(&key));
    let _ = supervisor.stop(&key);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_stops_every_active_session() {
    let supervisor = Supervisor::new();
    let a = SessionKey::miner("monero", "mainnet");
    let b = SessionKey::node("quai", "mainnet");
    supervisor.start(request(&a, "sleep 30")).unwrap();
    supervisor.start(request(&b, "sleep 30")).unwrap();
    assert_eq!(supervisor.sessions().len(), 2);

    supervisor.shutdown();
    assert!(!supervisor.is_running(&a));
    assert!(!supervisor.is_running(&b));
}

// =============================================================================
// Pre-spawn rejection
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn missing_binary_rejected_without_record() {
    let supervisor = Supervisor::new();
    let key = SessionKey::miner("monero", "mainnet");
    let mut req = request(&key, "sleep 1");
    req.binary = PathBuf::from("/nonexistent/rigsup/miner");

    let err = supervisor.start(req).unwrap_err();
    assert!(matches!(err, StartError::BinaryMissing(_)));
    assert!(supervisor.status(&key).is_none());
    assert!(!supervisor.is_running(&key));
}

#[tokio::test(flavor = "multi_thread")]
async fn short_identity_rejected_before_spawn() {
    let supervisor = Supervisor::new();
    let key = SessionKey::miner("monero", "mainnet");
    let mut req = request(&key, "sleep 30");
    req.identity = Some("abc".to_string());

    let err = supervisor.start(req).unwrap_err();
    assert!(matches!(err, StartError::InvalidIdentity(_)));
    assert!(supervisor.status(&key).is_none());
}

// =============================================================================
// Telemetry wiring
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn stdout_telemetry_reaches_metrics() {
    let supervisor = Supervisor::new();
    let key = SessionKey::miner("monero", "telemetry");
    supervisor
        .start(request(
            &key,
            "echo 'speed 10s/60s/15m 512.30 H/s 500.10 H/s'; \
             echo 'accepted (3/0) diff 120001'; sleep 10",
        ))
        .unwrap();

    let seen = wait_until(
        || {
            supervisor
                .status(&key)
                .is_some_and(|r| r.metrics.hashrate == 512.30 && r.metrics.accepted == 3)
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(seen, "metrics never reflected the scraped lines");
    let _ = supervisor.stop(&key);
}

#[tokio::test(flavor = "multi_thread")]
async fn stderr_is_scraped_as_well() {
    let supervisor = Supervisor::new();
    let key = SessionKey::node("quai", "telemetry");
    supervisor
        .start(request(
            &key,
            "echo 'chain synchronized with network' 1>&2; sleep 10",
        ))
        .unwrap();

    let seen = wait_until(
        || supervisor.status(&key).is_some_and(|r| r.metrics.synced),
        Duration::from_secs(5),
    )
    .await;
    assert!(seen, "sync flag never set from stderr line");
    let _ = supervisor.stop(&key);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_then_start_discards_stale_telemetry() {
    let supervisor = Supervisor::new();
    let key = SessionKey::miner("monero", "stale");

    // First session emits a rate after a short delay, then lingers.
    supervisor
        .start(request(
            &key,
            "sleep 0.2; echo 'hashrate: 9.0 kH/s'; sleep 10",
        ))
        .unwrap();
    let _ = supervisor.stop(&key);

    // Replacement session stays quiet; the old process's late line must not
    // leak into its snapshot.
    supervisor.start(request(&key, "sleep 10")).unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    let record = supervisor.status(&key).unwrap();
    assert_eq!(record.metrics.hashrate, 0.0);
    let _ = supervisor.stop(&key);
}
