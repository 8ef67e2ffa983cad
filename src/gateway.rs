//! Gateway orchestrator — builds the routing table and auth chain from
//! configuration, owns the listener task and the state machine.

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::middleware::{
    BranchMiddleware, CorsMiddleware, JwtAuthMiddleware, Middleware, Pipeline, RbacMiddleware,
};
use crate::observability::metrics::MetricsSnapshot;
use crate::observability::{AccessLog, GatewayMetrics};
use crate::probe::HealthProber;
use crate::proxy::HttpProxy;
use crate::registry::PortRegistry;
use crate::server::{self, MeshState};
use crate::{GatewayState, HealthStatus};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

/// The gateway instance
pub struct Gateway {
    config: GatewayConfig,
    state: Arc<RwLock<GatewayState>>,
    mesh: Arc<MeshState>,
    listener: Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
    started_at: RwLock<Option<Instant>>,
}

impl Gateway {
    /// Build a gateway from a validated configuration.
    ///
    /// Compiles the port registry and assembles the auth chain
    /// (CORS → JWT → RBAC → branch filter). Does not bind anything;
    /// call [`start`](Self::start) for that.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(PortRegistry::from_config(&config)?);
        let cors = Arc::new(CorsMiddleware::new(&config.cors));

        let pipeline = if config.services.is_empty() {
            Pipeline::empty()
        } else {
            let jwt = JwtAuthMiddleware::from_secret(&config.auth.secret)?;
            let rbac = RbacMiddleware::new(config.auth.super_admin_role.clone());
            let branch = BranchMiddleware::new(
                config.branches.assignments.clone(),
                config.auth.super_admin_role.clone(),
            );
            Pipeline::new(vec![
                cors.clone() as Arc<dyn Middleware>,
                Arc::new(jwt),
                Arc::new(rbac),
                Arc::new(branch),
            ])
        };

        let mesh = Arc::new(MeshState {
            registry,
            pipeline,
            cors,
            proxy: HttpProxy::with_timeout(Duration::from_secs(config.proxy_timeout_secs)),
            prober: HealthProber::new(Duration::from_secs(config.probe_timeout_secs)),
            metrics: Arc::new(GatewayMetrics::new()),
            access_log: Arc::new(AccessLog::new()),
            public_prefixes: config.auth.public_prefixes.clone(),
        });

        Ok(Self {
            config,
            state: Arc::new(RwLock::new(GatewayState::Created)),
            mesh,
            listener: Mutex::new(None),
            shutdown: Arc::new(AtomicBool::new(false)),
            started_at: RwLock::new(None),
        })
    }

    /// Bind the listener and start serving
    pub async fn start(&self) -> Result<()> {
        *self.state.write().await = GatewayState::Starting;

        // Already checked by validate(), parse cannot fail here
        let addr: SocketAddr = self
            .config
            .listen
            .parse()
            .map_err(|e| crate::GatewayError::Config(format!("Invalid listen address: {}", e)))?;

        let handle = server::start_listener(addr, self.mesh.clone()).await?;
        *self.listener.lock().await = Some(handle);
        *self.started_at.write().await = Some(Instant::now());
        *self.state.write().await = GatewayState::Running;

        tracing::info!(
            address = %addr,
            services = self.config.services.len(),
            "Gateway started"
        );
        Ok(())
    }

    /// Stop accepting connections and shut down
    pub async fn shutdown(&self) {
        *self.state.write().await = GatewayState::Stopping;
        tracing::info!("Gateway shutting down");

        if let Some(handle) = self.listener.lock().await.take() {
            handle.abort();
        }

        self.shutdown.store(true, Ordering::SeqCst);
        *self.state.write().await = GatewayState::Stopped;
        tracing::info!("Gateway stopped");
    }

    /// Block until [`shutdown`](Self::shutdown) has completed
    pub async fn wait_for_shutdown(&self) {
        while !self.shutdown.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Current lifecycle state
    pub async fn state(&self) -> GatewayState {
        self.state.read().await.clone()
    }

    /// Gateway health snapshot
    pub async fn health(&self) -> HealthStatus {
        let snapshot = self.mesh.metrics.snapshot();
        let uptime_secs = self
            .started_at
            .read()
            .await
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0);

        HealthStatus {
            state: self.state.read().await.clone(),
            uptime_secs,
            active_connections: snapshot.active_connections.max(0) as usize,
            total_requests: snapshot.total_requests,
        }
    }

    /// Point-in-time metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.mesh.metrics.snapshot()
    }

    /// The compiled routing table
    pub fn registry(&self) -> &PortRegistry {
        &self.mesh.registry
    }

    /// The active configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;

    fn test_config(listen: &str) -> GatewayConfig {
        let mut config = GatewayConfig {
            listen: listen.to_string(),
            ..GatewayConfig::default()
        };
        config.auth.secret = "test-secret".to_string();
        config.services.insert(
            "catalog-management".to_string(),
            ServiceConfig {
                port: 3020,
                health_path: "/health".to_string(),
            },
        );
        config
    }

    #[tokio::test]
    async fn test_new_gateway_is_created() {
        let gateway = Gateway::new(test_config("127.0.0.1:0")).unwrap();
        assert_eq!(gateway.state().await, GatewayState::Created);
        assert_eq!(gateway.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let mut config = test_config("127.0.0.1:0");
        config.auth.secret = String::new();
        assert!(Gateway::new(config).is_err());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let gateway = Gateway::new(test_config("127.0.0.1:0")).unwrap();
        gateway.start().await.unwrap();
        assert_eq!(gateway.state().await, GatewayState::Running);

        let health = gateway.health().await;
        assert_eq!(health.state, GatewayState::Running);
        assert_eq!(health.total_requests, 0);

        gateway.shutdown().await;
        assert_eq!(gateway.state().await, GatewayState::Stopped);
        gateway.wait_for_shutdown().await;
    }

    #[tokio::test]
    async fn test_empty_config_builds_empty_pipeline() {
        let gateway = Gateway::new(GatewayConfig::default()).unwrap();
        assert!(gateway.registry().is_empty());
        assert_eq!(gateway.metrics().total_requests, 0);
    }
}
