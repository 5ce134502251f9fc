//! Telemetry extraction from process output.
//!
//! Miners and node binaries emit human-readable log lines, not a structured
//! protocol. This module scrapes those lines into [`MetricsSnapshot`]
//! updates with a priority-ordered pattern list: the first pattern that
//! matches a line wins, lines matching nothing are silently dropped, and a
//! capture that fails numeric parsing counts as no match. The extractor only
//! ever rewrites metrics fields; lifecycle state belongs to the supervisor.

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, trace};

use crate::supervisor::registry::{Generation, SessionRegistry};
use crate::supervisor::session::{MetricsSnapshot, SessionKey};

/// One recognized observation scraped from a single output line.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    /// Rate normalized to H/s.
    Hashrate(f64),
    /// Running total of accepted shares, as reported by the miner.
    SharesAccepted(u64),
    /// Accepted-share line without a running total.
    ShareAccepted,
    /// Chain height reported by a node.
    BlockHeight(u64),
    /// Node reports it finished synchronizing.
    Synced,
}

/// XMRig-style summary line: `speed 10s/60s/15m 512.30 H/s ...`.
/// The first value (shortest window) is the one we report.
static SPEED_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bspeed\b\s+\S+\s+(\S+)").unwrap());

/// Generic `<number> <unit>/s` rate with an optional k/M/G prefix.
static RATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*([kmg]?)h/s").unwrap());

/// Pool acceptance with a running total, e.g. `accepted (17/0)`.
static ACCEPTED_TOTAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\baccepted\b\s*\((\d+)/\d+\)").unwrap());

static ACCEPTED_BARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\baccepted\b").unwrap());

/// Chain height as nodes report it: `height=N`, `height: N`, `number=N`,
/// `block height N`.
static BLOCK_HEIGHT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:block height\s+|height[=:]\s*|number[=:]\s*#?)(\d[\d,]*)").unwrap()
});

static SYNCED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:synchroni[sz]ed|sync (?:complete|completed|done|finished)|caught up)\b")
        .unwrap()
});

/// Scrape one line of process output.
///
/// Returns the highest-priority event the line yields, or `None` for
/// unknown and malformed lines.
pub fn scan_line(line: &str) -> Option<TelemetryEvent> {
    if let Some(caps) = SPEED_LINE.captures(line)
        && let Ok(rate) = caps[1].parse::<f64>()
    {
        return Some(TelemetryEvent::Hashrate(rate));
    }

    if let Some(caps) = RATE.captures(line)
        && let Ok(value) = caps[1].parse::<f64>()
    {
        let multiplier = match caps[2].to_ascii_lowercase().as_str() {
            "k" => 1e3,
            "m" => 1e6,
            "g" => 1e9,
            _ => 1.0,
        };
        return Some(TelemetryEvent::Hashrate(value * multiplier));
    }

    if let Some(caps) = ACCEPTED_TOTAL.captures(line)
        && let Ok(total) = caps[1].parse::<u64>()
    {
        return Some(TelemetryEvent::SharesAccepted(total));
    }
    if ACCEPTED_BARE.is_match(line) {
        return Some(TelemetryEvent::ShareAccepted);
    }

    if let Some(caps) = BLOCK_HEIGHT.captures(line)
        && let Ok(height) = caps[1].replace(',', "").parse::<u64>()
    {
        return Some(TelemetryEvent::BlockHeight(height));
    }

    if SYNCED.is_match(line) {
        return Some(TelemetryEvent::Synced);
    }

    None
}

/// Fold one event into a snapshot. Untouched fields keep their values.
pub fn apply(event: &TelemetryEvent, metrics: &mut MetricsSnapshot) {
    match event {
        TelemetryEvent::Hashrate(rate) => metrics.hashrate = *rate,
        TelemetryEvent::SharesAccepted(total) => metrics.accepted = *total,
        TelemetryEvent::ShareAccepted => metrics.accepted += 1,
        TelemetryEvent::BlockHeight(height) => metrics.accepted = *height,
        TelemetryEvent::Synced => metrics.synced = true,
    }
}

/// Drain one output stream of a supervised process, folding recognized
/// lines into the session's metrics until the stream closes.
///
/// Runs as its own task so a chatty or silent process never blocks the
/// supervisor. Writes are generation-guarded: once the session is stopped
/// or replaced, leftover lines from the old process go nowhere.
pub(crate) async fn pump<R>(
    reader: R,
    registry: SessionRegistry,
    key: SessionKey,
    generation: Generation,
    stream: &'static str,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                trace!(%key, stream, line = line.as_str(), "process output");
                if let Some(event) = scan_line(&line) {
                    debug!(%key, stream, ?event, "telemetry");
                    registry.update_metrics(&key, generation, |metrics| apply(&event, metrics));
                }
            }
            Ok(None) => break,
            Err(err) => {
                debug!(%key, stream, error = %err, "output stream closed");
                break;
            }
        }
    }
}
