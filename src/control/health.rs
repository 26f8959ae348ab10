//! Aggregate health

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::bridge::BridgeStatus;
use crate::stats::StatsSnapshot;

/// Overall health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Counters behind the health verdict
#[derive(Debug, Clone, Serialize)]
pub struct HealthDetails {
    pub cameras_total: usize,
    pub servers_running: usize,
    pub active_streams: usize,
    pub authenticated: bool,
    /// Sum of every bridge's counters
    pub totals: StatsSnapshot,
    pub bridges: Vec<BridgeStatus>,
}

/// Result of the `health` method
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub message: String,
    pub last_check: String,
    pub details: HealthDetails,
}

/// Compute health from bridge states
///
/// Unhealthy without an authenticated session; degraded when any bridge is
/// not listening; healthy otherwise. Idle bridges count as healthy.
pub fn evaluate(authenticated: bool, bridges: Vec<BridgeStatus>, now: DateTime<Utc>) -> HealthReport {
    let cameras_total = bridges.len();
    let servers_running = bridges.iter().filter(|b| b.running).count();
    let active_streams = bridges.iter().filter(|b| b.connected).count();

    let (state, message) = if !authenticated {
        (HealthState::Unhealthy, "Not authenticated".to_string())
    } else if servers_running < cameras_total {
        (
            HealthState::Degraded,
            format!("{}/{} stream servers running", servers_running, cameras_total),
        )
    } else {
        (
            HealthState::Healthy,
            format!("{} cameras ready, {} streaming", cameras_total, active_streams),
        )
    };

    HealthReport {
        state,
        message,
        last_check: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        details: HealthDetails {
            cameras_total,
            servers_running,
            active_streams,
            authenticated,
            totals: bridges.iter().map(|b| b.stats).sum(),
            bridges,
        },
    }
}
