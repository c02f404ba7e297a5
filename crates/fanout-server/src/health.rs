//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

use crate::manager::FanoutStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered peers.
    pub peers: usize,
    /// Messages broadcast so far.
    pub broadcasts: u64,
    /// Peers evicted for falling behind.
    pub evictions: u64,
    /// Peers dropped after a write failure or hang-up.
    pub disconnects: u64,
}

/// Build a health response from the manager's counters.
pub fn health_check(start_time: Instant, stats: FanoutStats) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        peers: stats.peers,
        broadcasts: stats.broadcasts,
        evictions: stats.evictions,
        disconnects: stats.disconnects,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), FanoutStats::default());
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, FanoutStats::default());
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn counters_copied() {
        let stats = FanoutStats {
            peers: 4,
            broadcasts: 120,
            evictions: 2,
            disconnects: 1,
        };
        let resp = health_check(Instant::now(), stats);
        assert_eq!(resp.peers, 4);
        assert_eq!(resp.broadcasts, 120);
        assert_eq!(resp.evictions, 2);
        assert_eq!(resp.disconnects, 1);
    }

    #[test]
    fn serialization() {
        let resp = health_check(Instant::now(), FanoutStats::default());
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["peers"], 0);
        assert!(parsed["uptime_secs"].is_number());
        assert!(parsed["evictions"].is_number());
    }
}
