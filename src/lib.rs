//! # Mesh Gateway
//!
//! The service-mesh routing layer for a multi-domain ERP/e-commerce platform:
//! a reverse proxy that receives all external HTTP traffic and forwards it to
//! the correct domain microservice by path prefix.
//!
//! ## Architecture
//!
//! ```text
//! Listener → CORS/OPTIONS → Port Registry → JWT → RBAC → Branch Filter → Proxy
//! ```
//!
//! ## Core Features
//!
//! - **Port-Registry Routing**: `/api/{service}/...` resolved by longest-prefix
//!   match against a static service → port table, prefix stripped exactly once
//! - **Token Validation**: HMAC-signed JWT bearer tokens (HS256)
//! - **Permission Filter**: domain × CRUD-verb RBAC derived from the HTTP method,
//!   with wildcard and super-admin bypass
//! - **Branch Isolation**: per-user branch assignment checks for multi-location tenants
//! - **Introspection**: `/health` with parallel downstream probing, `/registry`
//!   and `/api/status` routing-table dumps
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mesh_gateway::{config::GatewayConfig, Gateway};
//!
//! #[tokio::main]
//! async fn main() -> mesh_gateway::Result<()> {
//!     let config = GatewayConfig::from_file("gateway.hcl").await?;
//!     let gateway = Gateway::new(config)?;
//!     gateway.start().await?;
//!     gateway.wait_for_shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod observability;
pub(crate) mod probe;
pub(crate) mod proxy;
pub mod registry;
pub(crate) mod server;

// Re-export main types
pub use error::{GatewayError, Result};
pub use gateway::Gateway;
pub use middleware::{Claims, CrudAction, PermissionSet};
pub use registry::{PortRegistry, RouteEntry};

use serde::{Deserialize, Serialize};

/// Gateway runtime state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GatewayState {
    /// Gateway has been created but not yet started
    #[default]
    Created,
    /// Gateway is binding its listener and compiling the routing table
    Starting,
    /// Gateway is actively accepting and proxying requests
    Running,
    /// Gateway is draining connections and shutting down
    Stopping,
    /// Gateway has fully stopped
    Stopped,
}

impl std::fmt::Display for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Gateway health status snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Current gateway state
    pub state: GatewayState,
    /// Uptime in seconds since gateway started
    pub uptime_secs: u64,
    /// Number of active connections
    pub active_connections: usize,
    /// Total requests handled since start
    pub total_requests: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_state_default() {
        assert_eq!(GatewayState::default(), GatewayState::Created);
    }

    #[test]
    fn test_gateway_state_display() {
        assert_eq!(GatewayState::Created.to_string(), "created");
        assert_eq!(GatewayState::Starting.to_string(), "starting");
        assert_eq!(GatewayState::Running.to_string(), "running");
        assert_eq!(GatewayState::Stopping.to_string(), "stopping");
        assert_eq!(GatewayState::Stopped.to_string(), "stopped");
    }

    #[test]
    fn test_gateway_state_serialization() {
        let state = GatewayState::Running;
        let json = serde_json::to_string(&state).unwrap();
        let parsed: GatewayState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, GatewayState::Running);
    }

    #[test]
    fn test_health_status_default() {
        let health = HealthStatus::default();
        assert_eq!(health.state, GatewayState::Created);
        assert_eq!(health.uptime_secs, 0);
        assert_eq!(health.active_connections, 0);
        assert_eq!(health.total_requests, 0);
    }

    #[test]
    fn test_health_status_serialization() {
        let health = HealthStatus {
            state: GatewayState::Running,
            uptime_secs: 3600,
            active_connections: 42,
            total_requests: 10000,
        };
        let json = serde_json::to_string(&health).unwrap();
        let parsed: HealthStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.state, GatewayState::Running);
        assert_eq!(parsed.uptime_secs, 3600);
        assert_eq!(parsed.total_requests, 10000);
    }
}
