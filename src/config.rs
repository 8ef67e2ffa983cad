//! Configuration for the mesh gateway
//!
//! The single source of truth for the service → port table, the shared JWT
//! secret, CORS policy and branch assignments. Uses HCL (HashiCorp
//! Configuration Language) as the configuration format; a handful of
//! environment variables override individual values at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{GatewayError, Result};

/// Top-level gateway configuration
///
/// # HCL Example
///
/// ```hcl
/// listen             = "0.0.0.0:8080"
/// proxy_timeout_secs = 30
///
/// auth {
///   secret          = "change-me"
///   public_prefixes = ["/api/storefront"]
/// }
///
/// services "catalog-management" {
///   port = 3020
/// }
///
/// services "inventory-management" {
///   port = 3021
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listen address for the gateway (e.g. "0.0.0.0:8080")
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Proxy timeout in seconds for forwarded requests (default: 30)
    #[serde(default = "default_proxy_timeout")]
    pub proxy_timeout_secs: u64,

    /// Per-service timeout in seconds for the /health fan-out probe (default: 2)
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Authentication and authorization settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// CORS policy applied to every response
    #[serde(default)]
    pub cors: CorsConfig,

    /// Services: domain name → upstream port. Each entry becomes the
    /// route prefix `/api/{name}`.
    #[serde(default)]
    pub services: HashMap<String, ServiceConfig>,

    /// Branch isolation settings
    #[serde(default)]
    pub branches: BranchConfig,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_proxy_timeout() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    2
}

/// A single upstream domain service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// TCP port the service listens on (always on localhost within the mesh)
    pub port: u16,

    /// Health endpoint path probed by the /health fan-out (default: "/health")
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

fn default_health_path() -> String {
    "/health".to_string()
}

/// Authentication and authorization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared HMAC secret used to verify bearer tokens.
    /// Overridden by the `JWT_SECRET` environment variable.
    #[serde(default)]
    pub secret: String,

    /// Role that bypasses permission and branch checks (default: "super_admin")
    #[serde(default = "default_super_admin_role")]
    pub super_admin_role: String,

    /// Path prefixes reachable without a token. Anonymous access is only
    /// granted through this list — unresolved user context is otherwise
    /// rejected, never silently downgraded to a guest.
    #[serde(default)]
    pub public_prefixes: Vec<String>,
}

fn default_super_admin_role() -> String {
    "super_admin".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            super_admin_role: default_super_admin_role(),
            public_prefixes: Vec::new(),
        }
    }
}

/// CORS policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins (default: ["*"])
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Allowed methods (default: GET, POST, PUT, PATCH, DELETE, OPTIONS)
    #[serde(default)]
    pub allowed_methods: Vec<String>,

    /// Allowed request headers (default: Content-Type, Authorization)
    #[serde(default)]
    pub allowed_headers: Vec<String>,

    /// Preflight cache lifetime in seconds (default: 86400)
    #[serde(default)]
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allowed_methods: Vec::new(),
            allowed_headers: Vec::new(),
            max_age: None,
        }
    }
}

/// Branch isolation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchConfig {
    /// User id → branch ids the user may act on. A user's own token branch
    /// is always allowed in addition to this table.
    #[serde(default)]
    pub assignments: HashMap<String, Vec<i64>>,
}

impl GatewayConfig {
    /// Load configuration from an HCL file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            GatewayError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_hcl(&content)
    }

    /// Parse configuration from an HCL string
    pub fn from_hcl(content: &str) -> Result<Self> {
        hcl::from_str(content)
            .map_err(|e| GatewayError::Config(format!("Failed to parse HCL config: {}", e)))
    }

    /// Apply environment variable overrides:
    /// `JWT_SECRET`, `GATEWAY_PORT`, and `SERVICE_PORT_<NAME>` per service
    /// (name uppercased, dashes replaced with underscores).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            if !secret.is_empty() {
                self.auth.secret = secret;
            }
        }

        if let Ok(port) = std::env::var("GATEWAY_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                let host = self
                    .listen
                    .rsplit_once(':')
                    .map(|(h, _)| h.to_string())
                    .unwrap_or_else(|| "0.0.0.0".to_string());
                self.listen = format!("{}:{}", host, port);
            }
        }

        for (name, service) in self.services.iter_mut() {
            let var = format!(
                "SERVICE_PORT_{}",
                name.to_uppercase().replace('-', "_")
            );
            if let Ok(port) = std::env::var(&var) {
                if let Ok(port) = port.parse::<u16>() {
                    service.port = port;
                }
            }
        }
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        self.listen.parse::<SocketAddr>().map_err(|e| {
            GatewayError::Config(format!("Invalid listen address '{}': {}", self.listen, e))
        })?;

        if !self.services.is_empty() && self.auth.secret.is_empty() {
            return Err(GatewayError::Config(
                "Auth secret is empty — set auth.secret or the JWT_SECRET environment variable"
                    .to_string(),
            ));
        }

        // Every service must map to a distinct port
        let mut seen: HashMap<u16, &str> = HashMap::new();
        for (name, service) in &self.services {
            if service.port == 0 {
                return Err(GatewayError::Config(format!(
                    "Service '{}' has port 0",
                    name
                )));
            }
            if let Some(other) = seen.insert(service.port, name) {
                return Err(GatewayError::Config(format!(
                    "Services '{}' and '{}' share port {}",
                    other, name, service.port
                )));
            }
        }

        for prefix in &self.auth.public_prefixes {
            if !prefix.starts_with('/') {
                return Err(GatewayError::Config(format!(
                    "Public prefix '{}' must start with '/'",
                    prefix
                )));
            }
        }

        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            proxy_timeout_secs: default_proxy_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            auth: AuthConfig::default(),
            cors: CorsConfig::default(),
            services: HashMap::new(),
            branches: BranchConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> GatewayConfig {
        let mut config = GatewayConfig {
            auth: AuthConfig {
                secret: "test-secret".to_string(),
                ..AuthConfig::default()
            },
            ..GatewayConfig::default()
        };
        config.services.insert(
            "catalog-management".to_string(),
            ServiceConfig {
                port: 3020,
                health_path: default_health_path(),
            },
        );
        config
    }

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen, "0.0.0.0:8080");
        assert_eq!(config.proxy_timeout_secs, 30);
        assert_eq!(config.probe_timeout_secs, 2);
        assert!(config.services.is_empty());
        assert_eq!(config.auth.super_admin_role, "super_admin");
    }

    #[test]
    fn test_parse_minimal_config() {
        let hcl = r#"
            listen = "127.0.0.1:9000"
        "#;
        let config = GatewayConfig::from_hcl(hcl).unwrap();
        assert_eq!(config.listen, "127.0.0.1:9000");
    }

    #[test]
    fn test_parse_full_config() {
        let hcl = r#"
            listen             = "0.0.0.0:8080"
            proxy_timeout_secs = 15

            auth {
              secret           = "s3cret"
              super_admin_role = "root"
              public_prefixes  = ["/api/storefront"]
            }

            cors {
              allowed_origins = ["https://shop.example.com"]
              max_age         = 3600
            }

            services "catalog-management" {
              port = 3020
            }

            services "inventory-management" {
              port        = 3021
              health_path = "/healthz"
            }

            branches {
              assignments = { "user-1" = [1, 2] }
            }
        "#;
        let config = GatewayConfig::from_hcl(hcl).unwrap();
        assert_eq!(config.proxy_timeout_secs, 15);
        assert_eq!(config.auth.secret, "s3cret");
        assert_eq!(config.auth.super_admin_role, "root");
        assert_eq!(config.auth.public_prefixes, vec!["/api/storefront"]);
        assert_eq!(config.cors.allowed_origins, vec!["https://shop.example.com"]);
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services["catalog-management"].port, 3020);
        assert_eq!(config.services["catalog-management"].health_path, "/health");
        assert_eq!(config.services["inventory-management"].health_path, "/healthz");
        assert_eq!(config.branches.assignments["user-1"], vec![1, 2]);
    }

    #[test]
    fn test_parse_invalid_hcl() {
        let result = GatewayConfig::from_hcl("{{{{ invalid");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_validate_bad_listen_address() {
        let mut config = base_config();
        config.listen = "not-an-address".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid listen address"));
    }

    #[test]
    fn test_validate_empty_secret() {
        let mut config = base_config();
        config.auth.secret = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("secret"));
    }

    #[test]
    fn test_validate_empty_secret_without_services() {
        // A gateway with no routes has nothing to gate
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_duplicate_ports() {
        let mut config = base_config();
        config.services.insert(
            "orders".to_string(),
            ServiceConfig {
                port: 3020,
                health_path: default_health_path(),
            },
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("share port 3020"));
    }

    #[test]
    fn test_validate_port_zero() {
        let mut config = base_config();
        config.services.get_mut("catalog-management").unwrap().port = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("port 0"));
    }

    #[test]
    fn test_validate_bad_public_prefix() {
        let mut config = base_config();
        config.auth.public_prefixes.push("no-slash".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must start with '/'"));
    }

    #[test]
    fn test_env_override_jwt_secret() {
        let mut config = base_config();
        std::env::set_var("JWT_SECRET", "from-env");
        config.apply_env_overrides();
        std::env::remove_var("JWT_SECRET");
        assert_eq!(config.auth.secret, "from-env");
    }

    #[test]
    fn test_env_override_gateway_port() {
        let mut config = base_config();
        std::env::set_var("GATEWAY_PORT", "9999");
        config.apply_env_overrides();
        std::env::remove_var("GATEWAY_PORT");
        assert_eq!(config.listen, "0.0.0.0:9999");
    }

    #[test]
    fn test_env_override_service_port() {
        let mut config = base_config();
        std::env::set_var("SERVICE_PORT_CATALOG_MANAGEMENT", "4020");
        config.apply_env_overrides();
        std::env::remove_var("SERVICE_PORT_CATALOG_MANAGEMENT");
        assert_eq!(config.services["catalog-management"].port, 4020);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = base_config();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: GatewayConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.listen, config.listen);
        assert_eq!(parsed.services.len(), 1);
    }
}
