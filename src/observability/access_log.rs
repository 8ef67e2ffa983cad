//! Structured access/audit log — JSON-formatted request records
//!
//! Emits one structured entry per request, including the authenticated
//! user and denial reason when the auth chain rejected it. Recording is
//! best effort and never fails the request.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A single access log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogEntry {
    /// ISO 8601 timestamp
    pub timestamp: String,
    /// Client IP address
    pub client_ip: String,
    /// HTTP method
    pub method: String,
    /// Request path (before prefix stripping)
    pub path: String,
    /// HTTP status code
    pub status: u16,
    /// Request duration in milliseconds
    pub duration_ms: u64,
    /// Matched service name
    pub service: Option<String>,
    /// Authenticated user id (token subject)
    pub user: Option<String>,
    /// Denial reason when the auth chain rejected the request
    pub denial: Option<String>,
    /// User agent string
    pub user_agent: Option<String>,
}

/// Access log manager — tracks and emits structured log entries
pub struct AccessLog {
    total_entries: AtomicU64,
}

impl AccessLog {
    /// Create a new access log manager
    pub fn new() -> Self {
        Self {
            total_entries: AtomicU64::new(0),
        }
    }

    /// Start tracking a request. Returns a RequestTracker to measure duration.
    pub fn start_request(&self) -> RequestTracker {
        RequestTracker {
            start: Instant::now(),
        }
    }

    /// Record and emit a log entry
    pub fn record(&self, entry: &AccessLogEntry) {
        self.total_entries.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            target: "access_log",
            client_ip = entry.client_ip,
            method = entry.method,
            path = entry.path,
            status = entry.status,
            duration_ms = entry.duration_ms,
            service = entry.service.as_deref().unwrap_or("-"),
            user = entry.user.as_deref().unwrap_or("-"),
            denial = entry.denial.as_deref().unwrap_or("-"),
            "{}",
            serde_json::to_string(entry).unwrap_or_default()
        );
    }

    /// Get total number of logged entries
    pub fn total_entries(&self) -> u64 {
        self.total_entries.load(Ordering::Relaxed)
    }
}

impl Default for AccessLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks request duration
pub struct RequestTracker {
    start: Instant,
}

impl RequestTracker {
    /// Get elapsed time in milliseconds since the request started
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Build an access log entry from the tracked request
    pub fn build_entry(
        &self,
        client_ip: String,
        method: String,
        path: String,
        status: u16,
        service: Option<String>,
        user: Option<String>,
        denial: Option<String>,
        user_agent: Option<String>,
    ) -> AccessLogEntry {
        AccessLogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            client_ip,
            method,
            path,
            status,
            duration_ms: self.elapsed_ms(),
            service,
            user,
            denial,
            user_agent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> AccessLogEntry {
        AccessLogEntry {
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            client_ip: "10.0.0.1".to_string(),
            method: "DELETE".to_string(),
            path: "/api/inventory-management/items/5".to_string(),
            status: 403,
            duration_ms: 3,
            service: Some("inventory-management".to_string()),
            user: Some("user-1".to_string()),
            denial: Some("delete access to inventory-management".to_string()),
            user_agent: None,
        }
    }

    #[test]
    fn test_record_increments_counter() {
        let log = AccessLog::new();
        assert_eq!(log.total_entries(), 0);
        log.record(&sample_entry());
        log.record(&sample_entry());
        assert_eq!(log.total_entries(), 2);
    }

    #[test]
    fn test_entry_serialization() {
        let entry = sample_entry();
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: AccessLogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.status, 403);
        assert_eq!(parsed.denial.as_deref(), Some("delete access to inventory-management"));
    }

    #[test]
    fn test_tracker_builds_entry() {
        let log = AccessLog::new();
        let tracker = log.start_request();
        let entry = tracker.build_entry(
            "127.0.0.1".to_string(),
            "GET".to_string(),
            "/api/orders".to_string(),
            200,
            Some("orders".to_string()),
            None,
            None,
            Some("curl/8".to_string()),
        );
        assert_eq!(entry.client_ip, "127.0.0.1");
        assert_eq!(entry.status, 200);
        assert!(entry.denial.is_none());
    }
}
