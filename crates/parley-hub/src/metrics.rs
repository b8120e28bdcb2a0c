//! Runtime metrics: session, turn and tool counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Process-wide counters.
#[derive(Debug, Default)]
pub struct Metrics {
    pub sessions_opened: AtomicU64,
    pub sessions_closed: AtomicU64,
    pub turns_total: AtomicU64,
    pub turns_failed: AtomicU64,
    pub tool_calls: AtomicU64,
    pub summaries_written: AtomicU64,
    pub client_errors: AtomicU64,
    start_time: Option<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn record_session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_turn(&self, success: bool) {
        self.turns_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.turns_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_tool_call(&self) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_summary(&self) {
        self.summaries_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_client_error(&self) {
        self.client_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    /// Export as JSON.
    pub fn to_json(&self, active_sessions: usize) -> serde_json::Value {
        let uptime = self.uptime_secs();
        let hours = uptime / 3600;
        let minutes = (uptime % 3600) / 60;
        let seconds = uptime % 60;

        let turns = self.turns_total.load(Ordering::Relaxed);
        let failed = self.turns_failed.load(Ordering::Relaxed);

        serde_json::json!({
            "uptime": format!("{}h {}m {}s", hours, minutes, seconds),
            "uptime_secs": uptime,
            "sessions": {
                "active": active_sessions,
                "opened": self.sessions_opened.load(Ordering::Relaxed),
                "closed": self.sessions_closed.load(Ordering::Relaxed),
            },
            "turns": {
                "total": turns,
                "success": turns.saturating_sub(failed),
                "errors": failed,
            },
            "tool_calls": self.tool_calls.load(Ordering::Relaxed),
            "summaries": self.summaries_written.load(Ordering::Relaxed),
            "client_errors": self.client_errors.load(Ordering::Relaxed),
        })
    }
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;

pub fn new_metrics() -> SharedMetrics {
    Arc::new(Metrics::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_in_json() {
        let m = Metrics::new();
        m.record_session_opened();
        m.record_turn(true);
        m.record_turn(false);
        m.record_tool_call();

        let json = m.to_json(1);
        assert_eq!(json["sessions"]["active"], 1);
        assert_eq!(json["sessions"]["opened"], 1);
        assert_eq!(json["turns"]["total"], 2);
        assert_eq!(json["turns"]["success"], 1);
        assert_eq!(json["turns"]["errors"], 1);
        assert_eq!(json["tool_calls"], 1);
    }
}
