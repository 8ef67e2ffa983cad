//! CORS middleware — preflight handling and response header injection
//!
//! OPTIONS requests are answered immediately and never reach the proxy.
//! All other responses (including 4xx denials and proxy errors) get CORS
//! and basic security headers appended in the response phase.

use super::{Middleware, RequestContext};
use crate::config::CorsConfig;
use crate::error::Result;
use async_trait::async_trait;
use http::Response;

/// CORS middleware
pub struct CorsMiddleware {
    allowed_origins: Vec<String>,
    allowed_methods: Vec<String>,
    allowed_headers: Vec<String>,
    max_age: u64,
}

impl CorsMiddleware {
    /// Create a new CORS middleware from configuration
    pub fn new(config: &CorsConfig) -> Self {
        Self {
            allowed_origins: if config.allowed_origins.is_empty() {
                vec!["*".to_string()]
            } else {
                config.allowed_origins.clone()
            },
            allowed_methods: if config.allowed_methods.is_empty() {
                vec![
                    "GET".to_string(),
                    "POST".to_string(),
                    "PUT".to_string(),
                    "PATCH".to_string(),
                    "DELETE".to_string(),
                    "OPTIONS".to_string(),
                ]
            } else {
                config.allowed_methods.clone()
            },
            allowed_headers: if config.allowed_headers.is_empty() {
                vec!["Content-Type".to_string(), "Authorization".to_string()]
            } else {
                config.allowed_headers.clone()
            },
            max_age: config.max_age.unwrap_or(86400),
        }
    }

    fn origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == "*" || o == origin)
    }

    /// The origin value echoed back in responses
    fn response_origin(&self) -> &str {
        if self.allowed_origins.iter().any(|o| o == "*") {
            "*"
        } else {
            self.allowed_origins
                .first()
                .map(|s| s.as_str())
                .unwrap_or("*")
        }
    }

    /// Build the immediate preflight response for an OPTIONS request
    pub fn preflight(&self, origin: Option<&str>) -> Response<Vec<u8>> {
        let origin = origin.unwrap_or("*");

        if !self.origin_allowed(origin) {
            return Response::builder()
                .status(403)
                .body(b"Origin not allowed".to_vec())
                .unwrap();
        }

        let echo = if self.response_origin() == "*" {
            "*"
        } else {
            origin
        };
        Response::builder()
            .status(200)
            .header("Access-Control-Allow-Origin", echo)
            .header(
                "Access-Control-Allow-Methods",
                self.allowed_methods.join(", "),
            )
            .header(
                "Access-Control-Allow-Headers",
                self.allowed_headers.join(", "),
            )
            .header("Access-Control-Max-Age", self.max_age.to_string())
            .body(Vec::new())
            .unwrap()
    }

    /// Append CORS and security headers to an outgoing response
    pub fn apply(&self, parts: &mut http::response::Parts) {
        if let Ok(v) = self.response_origin().parse() {
            parts.headers.insert("Access-Control-Allow-Origin", v);
        }
        parts
            .headers
            .insert("X-Content-Type-Options", "nosniff".parse().unwrap());
    }
}

#[async_trait]
impl Middleware for CorsMiddleware {
    async fn handle_request(
        &self,
        req: &mut http::request::Parts,
        _ctx: &RequestContext,
    ) -> Result<Option<Response<Vec<u8>>>> {
        if req.method == http::Method::OPTIONS {
            let origin = req.headers.get("Origin").and_then(|v| v.to_str().ok());
            return Ok(Some(self.preflight(origin)));
        }
        Ok(None)
    }

    async fn handle_response(&self, resp: &mut http::response::Parts) -> Result<()> {
        self.apply(resp);
        Ok(())
    }

    fn name(&self) -> &str {
        "cors"
    }
}
