//! Gateway metrics — lightweight counters and gauges
//!
//! In-process atomic counters with a JSON-serializable snapshot, surfaced
//! through the gateway /health endpoint.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::RwLock;

/// Metrics snapshot — a point-in-time view of all metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Total requests received
    pub total_requests: u64,
    /// Responses by status code class (2xx, 3xx, 4xx, 5xx)
    pub status_classes: HashMap<String, u64>,
    /// Requests rejected by the auth chain (401 + 403)
    pub auth_denials: u64,
    /// Currently active connections
    pub active_connections: i64,
    /// Per-service request counts
    pub service_requests: HashMap<String, u64>,
}

/// Gateway metrics collector
pub struct GatewayMetrics {
    total_requests: AtomicU64,
    status_2xx: AtomicU64,
    status_3xx: AtomicU64,
    status_4xx: AtomicU64,
    status_5xx: AtomicU64,
    auth_denials: AtomicU64,
    active_connections: AtomicI64,
    service_requests: RwLock<HashMap<String, u64>>,
}

impl GatewayMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            status_2xx: AtomicU64::new(0),
            status_3xx: AtomicU64::new(0),
            status_4xx: AtomicU64::new(0),
            status_5xx: AtomicU64::new(0),
            auth_denials: AtomicU64::new(0),
            active_connections: AtomicI64::new(0),
            service_requests: RwLock::new(HashMap::new()),
        }
    }

    /// Record a completed request
    pub fn record_request(&self, status: u16) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        match status / 100 {
            2 => {
                self.status_2xx.fetch_add(1, Ordering::Relaxed);
            }
            3 => {
                self.status_3xx.fetch_add(1, Ordering::Relaxed);
            }
            4 => {
                self.status_4xx.fetch_add(1, Ordering::Relaxed);
            }
            5 => {
                self.status_5xx.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    /// Record an auth-chain denial (401/403)
    pub fn record_auth_denial(&self) {
        self.auth_denials.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request routed to a specific service
    pub fn record_service_request(&self, service: &str) {
        let mut map = self.service_requests.write().unwrap();
        *map.entry(service.to_string()).or_insert(0) += 1;
    }

    /// Connection opened
    pub fn inc_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Connection closed
    pub fn dec_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut status_classes = HashMap::new();
        status_classes.insert("2xx".to_string(), self.status_2xx.load(Ordering::Relaxed));
        status_classes.insert("3xx".to_string(), self.status_3xx.load(Ordering::Relaxed));
        status_classes.insert("4xx".to_string(), self.status_4xx.load(Ordering::Relaxed));
        status_classes.insert("5xx".to_string(), self.status_5xx.load(Ordering::Relaxed));

        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            status_classes,
            auth_denials: self.auth_denials.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            service_requests: self.service_requests.read().unwrap().clone(),
        }
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
