//! Proxy forwarder — streams requests to the resolved upstream service
//!
//! One pooled HTTP client is shared across all requests. Bodies are
//! streamed in both directions rather than buffered, so large payloads
//! never materialize in gateway memory. Connection failures map to 502 and
//! timeouts to 504; nothing is retried.

use crate::error::{GatewayError, Result};
use std::time::Duration;

/// Default proxy timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP forwarder for the mesh
pub struct HttpProxy {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProxy {
    /// Create a new proxy with the default 30s timeout
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a new proxy with a custom timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(100)
            .build()
            .unwrap_or_default();

        Self { client, timeout }
    }

    /// Forward a request to `service` on localhost:`port`.
    ///
    /// `parts.uri` must already carry the stripped path; inbound headers are
    /// copied except hop-by-hop headers and `host`, with `x-forwarded-for`
    /// and the mesh marker appended. The upstream response is returned
    /// unread so the caller can stream its body.
    pub async fn forward(
        &self,
        service: &str,
        port: u16,
        parts: &http::request::Parts,
        body: reqwest::Body,
        client_ip: &str,
    ) -> Result<reqwest::Response> {
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = upstream_url(port, path_and_query);

        let mut req_builder = self.client.request(parts.method.clone(), &url);

        for (key, value) in parts.headers.iter() {
            if is_hop_by_hop(key.as_str()) || key == http::header::HOST {
                continue;
            }
            req_builder = req_builder.header(key.clone(), value.clone());
        }

        let forwarded_for = match parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
        {
            Some(existing) => format!("{}, {}", existing, client_ip),
            None => client_ip.to_string(),
        };
        req_builder = req_builder
            .header("x-forwarded-for", forwarded_for)
            .header("x-mesh-gateway", "1")
            .body(body);

        req_builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::UpstreamTimeout(self.timeout.as_millis() as u64)
            } else if e.is_connect() {
                GatewayError::ServiceUnavailable(service.to_string())
            } else {
                GatewayError::Http(e)
            }
        })
    }

    /// Configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HttpProxy {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the upstream URL for a mesh-local service
fn upstream_url(port: u16, path_and_query: &str) -> String {
    format!("http://127.0.0.1:{}{}", port, path_and_query)
}

/// Check if a header is a hop-by-hop header that should not be forwarded
pub(crate) fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_by_hop_headers() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("connection"));
        assert!(is_hop_by_hop("Keep-Alive"));
        assert!(is_hop_by_hop("Transfer-Encoding"));
        assert!(is_hop_by_hop("Upgrade"));
        assert!(is_hop_by_hop("Proxy-Authorization"));

        assert!(!is_hop_by_hop("Content-Type"));
        assert!(!is_hop_by_hop("Authorization"));
        assert!(!is_hop_by_hop("X-Forwarded-For"));
        assert!(!is_hop_by_hop("Host"));
    }

    #[test]
    fn test_upstream_url() {
        assert_eq!(
            upstream_url(3020, "/products?page=1"),
            "http://127.0.0.1:3020/products?page=1"
        );
        assert_eq!(upstream_url(3021, "/"), "http://127.0.0.1:3021/");
    }

    #[test]
    fn test_proxy_default_timeout() {
        let proxy = HttpProxy::default();
        assert_eq!(proxy.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_proxy_custom_timeout() {
        let proxy = HttpProxy::with_timeout(Duration::from_secs(5));
        assert_eq!(proxy.timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_forward_connection_refused() {
        // Port 1 is never listening
        let proxy = HttpProxy::with_timeout(Duration::from_secs(2));
        let (parts, _) = http::Request::builder()
            .uri("/items")
            .body(())
            .unwrap()
            .into_parts();
        let err = proxy
            .forward("inventory-management", 1, &parts, reqwest::Body::from(""), "127.0.0.1")
            .await
            .unwrap_err();
        match err {
            GatewayError::ServiceUnavailable(service) => {
                assert_eq!(service, "inventory-management")
            }
            other => panic!("Expected ServiceUnavailable, got {:?}", other),
        }
    }
}
