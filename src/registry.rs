//! Port registry — static service → port routing table
//!
//! Every configured service is reachable under the path prefix
//! `/api/{service-name}`. Matching is longest-prefix with deterministic
//! tie-breaking (length descending, then lexicographic), so
//! `/api/catalog-management/x` can never be captured by a shorter
//! `/api/catalog` entry regardless of table order.

use crate::config::GatewayConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// A single immutable routing table entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Service (domain) name, e.g. "catalog-management"
    pub service: String,
    /// Path prefix, e.g. "/api/catalog-management"
    pub path_prefix: String,
    /// Upstream TCP port on localhost
    pub port: u16,
    /// Health endpoint path on the upstream
    pub health_path: String,
}

/// The result of matching a request path against the registry
#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    /// Matched service name
    pub service: &'a str,
    /// Upstream port
    pub port: u16,
    /// Remainder of the path after stripping the prefix exactly once.
    /// Always starts with '/'.
    pub stripped_path: String,
}

/// Static routing table, fixed at process start
pub struct PortRegistry {
    /// Entries sorted by prefix length descending, then lexicographically
    entries: Vec<RouteEntry>,
}

impl PortRegistry {
    /// Build the registry from configuration
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let mut entries: Vec<RouteEntry> = config
            .services
            .iter()
            .map(|(name, svc)| RouteEntry {
                service: name.clone(),
                path_prefix: format!("/api/{}", name),
                port: svc.port,
                health_path: svc.health_path.clone(),
            })
            .collect();

        entries.sort_by(|a, b| {
            b.path_prefix
                .len()
                .cmp(&a.path_prefix.len())
                .then_with(|| a.path_prefix.cmp(&b.path_prefix))
        });

        Ok(Self { entries })
    }

    /// Match a request path against the table.
    ///
    /// Longest prefix wins; the prefix is stripped exactly once and the
    /// remainder is returned with a leading '/'.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch<'_>> {
        for entry in &self.entries {
            if let Some(rest) = path.strip_prefix(entry.path_prefix.as_str()) {
                // Prefix boundary: "/api/catalog" must not match "/api/catalog-v2/x"
                if !rest.is_empty() && !rest.starts_with('/') {
                    continue;
                }
                let stripped_path = if rest.is_empty() {
                    "/".to_string()
                } else {
                    rest.to_string()
                };
                return Some(RouteMatch {
                    service: &entry.service,
                    port: entry.port,
                    stripped_path,
                });
            }
        }
        None
    }

    /// Direct service-name lookup (case-sensitive, no normalization)
    pub fn resolve_service(&self, name: &str) -> Option<u16> {
        self.entries
            .iter()
            .find(|e| e.service == name)
            .map(|e| e.port)
    }

    /// All known path prefixes, in match order
    pub fn prefixes(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.path_prefix.as_str()).collect()
    }

    /// All registered entries, in match order
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Number of registered routes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
