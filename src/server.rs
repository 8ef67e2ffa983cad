//! Gateway HTTP server — listener, dispatch and proxy glue
//!
//! Per-request control flow: OPTIONS/CORS short-circuit → reserved
//! introspection endpoints → longest-prefix registry match → auth chain
//! (JWT → RBAC → branch) → streaming proxy to the resolved service port.
//! Bodies are piped through in both directions without buffering.

use crate::error::{GatewayError, Result};
use crate::middleware::{Claims, CorsMiddleware, CrudAction, Pipeline, RequestContext};
use crate::observability::access_log::RequestTracker;
use crate::observability::{AccessLog, GatewayMetrics};
use crate::probe::{self, HealthProber};
use crate::proxy::{self, HttpProxy};
use crate::registry::PortRegistry;
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, BodyStream, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::ReceiverStream;

/// Response body type used throughout the server
pub type GatewayBody = BoxBody<Bytes, std::io::Error>;

/// Shared state for request handling — immutable after startup
pub struct MeshState {
    pub registry: Arc<PortRegistry>,
    pub pipeline: Pipeline,
    pub cors: Arc<CorsMiddleware>,
    pub proxy: HttpProxy,
    pub prober: HealthProber,
    pub metrics: Arc<GatewayMetrics>,
    pub access_log: Arc<AccessLog>,
    /// Path prefixes reachable without a token
    pub public_prefixes: Vec<String>,
}

impl MeshState {
    fn is_public(&self, path: &str) -> bool {
        self.public_prefixes.iter().any(|p| prefix_matches(p, path))
    }
}

/// Prefix match on a path segment boundary: "/api/storefront" covers
/// "/api/storefront/products" but never "/api/storefront-admin/...".
fn prefix_matches(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Bind the listener and start accepting connections
pub async fn start_listener(
    addr: SocketAddr,
    state: Arc<MeshState>,
) -> Result<tokio::task::JoinHandle<()>> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::Other(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!(
        address = %addr,
        routes = state.registry.len(),
        "Gateway listening"
    );

    let handle = tokio::spawn(async move {
        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    continue;
                }
            };

            let state = state.clone();
            tokio::spawn(async move {
                state.metrics.inc_connections();
                let io = TokioIo::new(stream);
                let svc_state = state.clone();
                let _ = http1::Builder::new()
                    .serve_connection(
                        io,
                        service_fn(move |req| {
                            handle_request(req, remote_addr, svc_state.clone())
                        }),
                    )
                    .await;
                state.metrics.dec_connections();
            });
        }
    });

    Ok(handle)
}

/// Metadata carried into the access log for one request
struct LogMeta {
    client_ip: String,
    method: String,
    path: String,
    service: Option<String>,
    user: Option<String>,
    denial: Option<String>,
    user_agent: Option<String>,
}

/// Handle an individual HTTP request
async fn handle_request(
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    state: Arc<MeshState>,
) -> std::result::Result<hyper::Response<GatewayBody>, Infallible> {
    let (mut parts, body) = req.into_parts();
    let tracker = state.access_log.start_request();

    let client_ip = remote_addr.ip().to_string();
    let method = parts.method.to_string();
    let path = parts.uri.path().to_string();
    let user_agent = parts
        .headers
        .get(http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let mut meta = LogMeta {
        client_ip: client_ip.clone(),
        method,
        path: path.clone(),
        service: None,
        user: None,
        denial: None,
        user_agent,
    };

    // Preflight never reaches routing or the proxy
    if parts.method == http::Method::OPTIONS {
        let origin = parts.headers.get("Origin").and_then(|v| v.to_str().ok());
        let resp = from_parts_response(state.cors.preflight(origin));
        return Ok(finalize(&state, &tracker, meta, resp));
    }

    // Reserved introspection endpoints
    if parts.method == http::Method::GET {
        match path.as_str() {
            "/health" => {
                let resp = health_response(&state).await;
                let resp = with_cors(&state.cors, resp);
                return Ok(finalize(&state, &tracker, meta, resp));
            }
            "/registry" | "/api/status" => {
                let resp = registry_response(&state);
                let resp = with_cors(&state.cors, resp);
                return Ok(finalize(&state, &tracker, meta, resp));
            }
            _ => {}
        }
    }

    // Longest-prefix match against the port registry
    let (service, port, stripped_path) = match state.registry.resolve(&path) {
        Some(m) => (m.service.to_string(), m.port, m.stripped_path),
        None => {
            let body = serde_json::json!({
                "error": "Not Found",
                "availableRoutes": state.registry.prefixes(),
            });
            let resp = with_cors(&state.cors, json_response(404, &body));
            return Ok(finalize(&state, &tracker, meta, resp));
        }
    };
    meta.service = Some(service.clone());
    state.metrics.record_service_request(&service);

    // Auth chain, skipped only for configured public prefixes
    let public = state.is_public(&path);
    let ctx = RequestContext {
        client_ip: client_ip.clone(),
        service: service.clone(),
        action: CrudAction::from_method(&parts.method),
    };

    if !public {
        match state.pipeline.process_request(&mut parts, &ctx).await {
            Ok(Some(response)) => {
                meta.user = parts.extensions.get::<Claims>().map(|c| c.sub.clone());
                meta.denial = denial_reason(response.body());
                state.metrics.record_auth_denial();

                let (mut resp_parts, body) = response.into_parts();
                state.cors.apply(&mut resp_parts);
                let resp =
                    hyper::Response::from_parts(resp_parts, full_body(Bytes::from(body)));
                return Ok(finalize(&state, &tracker, meta, resp));
            }
            Ok(None) => {
                meta.user = parts.extensions.get::<Claims>().map(|c| c.sub.clone());
            }
            Err(e) => {
                tracing::error!(error = %e, "Middleware error");
                let body = serde_json::json!({ "error": "Internal server error" });
                let resp = with_cors(&state.cors, json_response(500, &body));
                return Ok(finalize(&state, &tracker, meta, resp));
            }
        }
    }

    // Rewrite the URI to the stripped path, preserving the query string
    let rewritten = rewrite_uri(&stripped_path, parts.uri.query());
    match rewritten {
        Some(uri) => parts.uri = uri,
        None => {
            tracing::error!(path = %stripped_path, "Stripped path is not a valid URI");
            let body = serde_json::json!({ "error": "Internal server error" });
            let resp = with_cors(&state.cors, json_response(500, &body));
            return Ok(finalize(&state, &tracker, meta, resp));
        }
    }

    // Forward and stream the response back
    let out_body = request_body_stream(body);
    match state
        .proxy
        .forward(&service, port, &parts, out_body, &client_ip)
        .await
    {
        Ok(upstream) => {
            let mut builder = http::Response::builder().status(upstream.status());
            for (key, value) in upstream.headers().iter() {
                if !proxy::is_hop_by_hop(key.as_str()) {
                    builder = builder.header(key, value);
                }
            }
            let (mut resp_parts, _) = builder.body(()).unwrap().into_parts();

            if public {
                state.cors.apply(&mut resp_parts);
            } else if let Err(e) = state.pipeline.process_response(&mut resp_parts).await {
                tracing::warn!(error = %e, "Response middleware error");
            }

            let resp =
                hyper::Response::from_parts(resp_parts, response_body_stream(upstream));
            Ok(finalize(&state, &tracker, meta, resp))
        }
        Err(e) => {
            tracing::error!(error = %e, service, "Proxy error");
            let (status, body) = match &e {
                GatewayError::UpstreamTimeout(_) => (
                    504,
                    serde_json::json!({ "error": "Gateway Timeout", "service": service }),
                ),
                GatewayError::ServiceUnavailable(_) => (
                    502,
                    serde_json::json!({ "error": "Bad Gateway", "service": service }),
                ),
                other => (
                    502,
                    serde_json::json!({ "error": other.to_string(), "service": service }),
                ),
            };
            let resp = with_cors(&state.cors, json_response(status, &body));
            Ok(finalize(&state, &tracker, meta, resp))
        }
    }
}

/// Aggregate /health: gateway info plus parallel downstream probing
async fn health_response(state: &MeshState) -> hyper::Response<GatewayBody> {
    let results = state.prober.probe_all(&state.registry).await;
    let summary = probe::summarize(&results);
    let status = if summary.unhealthy == 0 { "ok" } else { "degraded" };

    let body = serde_json::json!({
        "status": status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "gateway": {
            "version": env!("CARGO_PKG_VERSION"),
            "metrics": state.metrics.snapshot(),
        },
        "services": results,
        "summary": summary,
    });
    json_response(200, &body)
}

/// Dump of the static routing table
fn registry_response(state: &MeshState) -> hyper::Response<GatewayBody> {
    let mut endpoints = serde_json::Map::new();
    for entry in state.registry.entries() {
        endpoints.insert(
            entry.service.clone(),
            serde_json::Value::String(entry.path_prefix.clone()),
        );
    }
    let mut services: Vec<&str> = state
        .registry
        .entries()
        .iter()
        .map(|e| e.service.as_str())
        .collect();
    services.sort_unstable();

    let body = serde_json::json!({
        "services": services,
        "endpoints": endpoints,
    });
    json_response(200, &body)
}

/// Record metrics and the access log entry, then hand the response back
fn finalize(
    state: &MeshState,
    tracker: &RequestTracker,
    meta: LogMeta,
    resp: hyper::Response<GatewayBody>,
) -> hyper::Response<GatewayBody> {
    let status = resp.status().as_u16();
    state.metrics.record_request(status);
    state.access_log.record(&tracker.build_entry(
        meta.client_ip,
        meta.method,
        meta.path,
        status,
        meta.service,
        meta.user,
        meta.denial,
        meta.user_agent,
    ));
    resp
}

/// Pull the human-readable denial reason out of an auth-chain response body
fn denial_reason(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("required")
        .or_else(|| value.get("error"))
        .and_then(|s| s.as_str())
        .map(String::from)
}

/// Rebuild the request target from the stripped path and original query
fn rewrite_uri(stripped_path: &str, query: Option<&str>) -> Option<http::Uri> {
    let pq = match query {
        Some(q) => format!("{}?{}", stripped_path, q),
        None => stripped_path.to_string(),
    };
    pq.parse().ok()
}

fn full_body(bytes: Bytes) -> GatewayBody {
    Full::new(bytes).map_err(std::io::Error::other).boxed()
}

fn json_response(status: u16, body: &serde_json::Value) -> hyper::Response<GatewayBody> {
    hyper::Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(full_body(Bytes::from(body.to_string())))
        .unwrap()
}

fn from_parts_response(resp: http::Response<Vec<u8>>) -> hyper::Response<GatewayBody> {
    let (parts, body) = resp.into_parts();
    hyper::Response::from_parts(parts, full_body(Bytes::from(body)))
}

fn with_cors(
    cors: &CorsMiddleware,
    resp: hyper::Response<GatewayBody>,
) -> hyper::Response<GatewayBody> {
    let (mut parts, body) = resp.into_parts();
    cors.apply(&mut parts);
    hyper::Response::from_parts(parts, body)
}

/// Pipe the inbound request body through to the upstream without buffering
fn request_body_stream(body: Incoming) -> reqwest::Body {
    let stream = BodyStream::new(body)
        .try_filter_map(|frame| std::future::ready(Ok(frame.into_data().ok())));
    reqwest::Body::wrap_stream(stream)
}

/// Pipe the upstream response body back to the client without buffering
fn response_body_stream(upstream: reqwest::Response) -> GatewayBody {
    let (tx, rx) = tokio::sync::mpsc::channel::<
        std::result::Result<Frame<Bytes>, std::io::Error>,
    >(16);
    tokio::spawn(async move {
        let mut stream = upstream.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let item = chunk.map(Frame::data).map_err(std::io::Error::other);
            let failed = item.is_err();
            if tx.send(item).await.is_err() || failed {
                break;
            }
        }
    });
    BodyExt::boxed(StreamBody::new(ReceiverStream::new(rx)))
}
