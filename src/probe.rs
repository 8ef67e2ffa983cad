//! Health prober — parallel `GET /health` fan-out to every registered service
//!
//! Each probe has its own short timeout so a dead service delays the
//! aggregate by at most that bound. Results are aggregated into
//! healthy/unhealthy counts for the gateway's own /health endpoint.

use crate::registry::PortRegistry;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Probe outcome for a single service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    /// Service name
    pub service: String,
    /// Upstream port
    pub port: u16,
    /// Whether the service answered 2xx within the probe timeout
    pub healthy: bool,
}

/// Aggregate counts across all probed services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
}

/// Fan-out health prober
pub struct HealthProber {
    client: reqwest::Client,
}

impl HealthProber {
    /// Create a prober with the given per-service timeout
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Probe every registered service in parallel
    pub async fn probe_all(&self, registry: &PortRegistry) -> Vec<ServiceHealth> {
        let probes = registry.entries().iter().map(|entry| {
            let url = format!("http://127.0.0.1:{}{}", entry.port, entry.health_path);
            let client = self.client.clone();
            let service = entry.service.clone();
            let port = entry.port;
            async move {
                let healthy = matches!(
                    client.get(&url).send().await,
                    Ok(resp) if resp.status().is_success()
                );
                ServiceHealth {
                    service,
                    port,
                    healthy,
                }
            }
        });

        join_all(probes).await
    }
}

/// Summarize probe results
pub fn summarize(results: &[ServiceHealth]) -> HealthSummary {
    let healthy = results.iter().filter(|r| r.healthy).count();
    HealthSummary {
        total: results.len(),
        healthy,
        unhealthy: results.len() - healthy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewayConfig, ServiceConfig};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn registry_for(services: Vec<(&str, u16)>) -> PortRegistry {
        let mut config = GatewayConfig::default();
        config.auth.secret = "test-secret".to_string();
        for (name, port) in services {
            config.services.insert(
                name.to_string(),
                ServiceConfig {
                    port,
                    health_path: "/health".to_string(),
                },
            );
        }
        PortRegistry::from_config(&config).unwrap()
    }

    /// Minimal HTTP backend answering 200 to anything
    async fn spawn_healthy_backend() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(s) => s,
                    Err(_) => break,
                };
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    let _ = stream
                        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                        .await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        port
    }

    #[test]
    fn test_summarize() {
        let results = vec![
            ServiceHealth {
                service: "a".to_string(),
                port: 1,
                healthy: true,
            },
            ServiceHealth {
                service: "b".to_string(),
                port: 2,
                healthy: false,
            },
        ];
        let summary = summarize(&results);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.healthy, 1);
        assert_eq!(summary.unhealthy, 1);
    }

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.healthy, 0);
        assert_eq!(summary.unhealthy, 0);
    }

    #[tokio::test]
    async fn test_probe_mixed_results() {
        let live_port = spawn_healthy_backend().await;
        // Port 1 refuses connections
        let registry = registry_for(vec![("orders", live_port), ("labels", 1)]);

        let prober = HealthProber::new(Duration::from_secs(2));
        let results = prober.probe_all(&registry).await;
        assert_eq!(results.len(), 2);

        let orders = results.iter().find(|r| r.service == "orders").unwrap();
        let labels = results.iter().find(|r| r.service == "labels").unwrap();
        assert!(orders.healthy);
        assert!(!labels.healthy);

        let summary = summarize(&results);
        assert_eq!(summary.healthy, 1);
        assert_eq!(summary.unhealthy, 1);
    }

    #[tokio::test]
    async fn test_probe_empty_registry() {
        let registry = registry_for(vec![]);
        let prober = HealthProber::new(Duration::from_secs(1));
        let results = prober.probe_all(&registry).await;
        assert!(results.is_empty());
    }
}
