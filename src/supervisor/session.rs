//! Session identity, lifecycle states, and telemetry snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Composite identifier for one supervised process.
///
/// Pairs a participation scope (which workload against which network) with an
/// environment tag. Exactly one process may be active per key at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    /// Participation scope, e.g. `miner/monero` or `node/quai`.
    pub scope: String,
    /// Environment tag, e.g. `mainnet` or `testnet`.
    pub env: String,
}

impl SessionKey {
    pub fn new(scope: impl Into<String>, env: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            env: env.into(),
        }
    }

    /// Key for a mining session against `network`.
    pub fn miner(network: &str, env: &str) -> Self {
        Self::new(format!("miner/{network}"), env)
    }

    /// Key for a node process for `network`.
    pub fn node(network: &str, env: &str) -> Self {
        Self::new(format!("node/{network}"), env)
    }

    /// Filesystem-safe form used for per-session directories.
    pub fn dir_name(&self) -> String {
        format!("{}@{}", self.scope.replace('/', "-"), self.env)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.scope, self.env)
    }
}

/// Lifecycle of a supervised process.
///
/// `Starting -> Running -> Stopped | Exited`, or `Starting -> Failed` when
/// the spawn is refused. Terminal states never transition back; a new start
/// under the same key replaces the record wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Key reserved, spawn in flight.
    Starting,
    /// Process spawned and being observed.
    Running,
    /// Caller requested termination.
    Stopped,
    /// Process exited on its own.
    Exited,
    /// Spawn or wait failed.
    Failed,
}

impl Lifecycle {
    /// Whether the session still owns a live (or about-to-be-live) process.
    pub fn is_active(self) -> bool {
        matches!(self, Lifecycle::Starting | Lifecycle::Running)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Short label for status displays.
    pub fn label(self) -> &'static str {
        match self {
            Lifecycle::Starting => "starting",
            Lifecycle::Running => "running",
            Lifecycle::Stopped => "stopped",
            Lifecycle::Exited => "exited",
            Lifecycle::Failed => "failed",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Last-known metrics scraped from a process's output.
///
/// Overwritten field-by-field as telemetry lines arrive; never historized
/// here. A fresh snapshot is zeroed on every start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Reported rate in H/s (normalized from k/M/G units).
    pub hashrate: f64,
    /// Secondary counter: accepted shares for miners, block height for nodes.
    pub accepted: u64,
    /// Whether a node workload reported itself fully synchronized.
    pub synced: bool,
    /// False once the owning process is gone.
    pub active: bool,
    pub started_at: DateTime<Utc>,
}

impl MetricsSnapshot {
    /// Zeroed snapshot for a session starting now.
    pub fn fresh(started_at: DateTime<Utc>) -> Self {
        Self {
            hashrate: 0.0,
            accepted: 0,
            synced: false,
            active: true,
            started_at,
        }
    }
}

/// One entry in the session registry.
///
/// The actual child handle is owned by the supervisor's monitor task; the
/// record carries the pid so a stop can signal the process without touching
/// the handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub key: SessionKey,
    pub pid: Option<u32>,
    pub state: Lifecycle,
    /// Binary that was launched, for display and diagnostics.
    pub binary: PathBuf,
    pub spawned_at: DateTime<Utc>,
    pub metrics: MetricsSnapshot,
    /// Exit code once the process terminated on its own.
    pub exit_code: Option<i32>,
    /// Failure reason for `Failed` records.
    pub error: Option<String>,
}

impl SessionRecord {
    pub(crate) fn starting(key: SessionKey, binary: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            key,
            pid: None,
            state: Lifecycle::Starting,
            binary,
            spawned_at: now,
            metrics: MetricsSnapshot::fresh(now),
            exit_code: None,
            error: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.is_active()
    }

    /// One-line summary for status displays and logs.
    pub fn summary(&self) -> String {
        match self.state {
            Lifecycle::Running => format!(
                "{} {} (pid {})",
                self.key,
                self.state,
                self.pid.map_or_else(|| "?".into(), |p| p.to_string())
            ),
            Lifecycle::Exited => match self.exit_code {
                Some(code) => format!("{} exited with code {code}", self.key),
                None => format!("{} exited", self.key),
            },
            Lifecycle::Failed => format!(
                "{} failed: {}",
                self.key,
                self.error.as_deref().unwrap_or("unknown error")
            ),
            _ => format!("{} {}", self.key, self.state),
        }
    }
}
