//! JWT authentication middleware — validates bearer tokens
//!
//! Extracts the token from the Authorization header (optional "Bearer "
//! prefix), verifies signature and expiry against the shared HMAC secret,
//! and stores the decoded claims in the request extensions for the
//! permission and branch filters downstream.

use crate::error::{GatewayError, Result};
use crate::middleware::{CrudAction, Middleware, RequestContext};
use async_trait::async_trait;
use http::Response;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decoded token claims. Recomputed per request, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    #[serde(default)]
    pub sub: String,
    /// Role name, e.g. "store_manager" or the super-admin sentinel
    #[serde(default)]
    pub role: String,
    /// Frontend application the user is assigned to
    #[serde(default, rename = "assignedApp")]
    pub assigned_app: Option<String>,
    /// Home branch id for multi-location tenants
    #[serde(default, rename = "branchId")]
    pub branch_id: Option<i64>,
    /// Per-domain permission table, or the wildcard "all"
    #[serde(default)]
    pub permissions: PermissionSet,
    /// Expiration time (UTC timestamp)
    #[serde(default)]
    pub exp: u64,
    /// Issued at (UTC timestamp)
    #[serde(default)]
    pub iat: u64,
}

/// A user's permission grants: either the wildcard string `"all"` or a
/// nested `domain → verb → bool` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionSet {
    /// String form — only the exact value "all" grants anything
    Wildcard(String),
    /// domain → verb → allowed
    Table(HashMap<String, HashMap<String, bool>>),
}

impl PermissionSet {
    /// The "all" wildcard that authorizes every (domain, action) pair
    pub fn all() -> Self {
        Self::Wildcard("all".to_string())
    }

    /// Whether this set is the "all" wildcard
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard(s) if s == "all")
    }

    /// Whether `action` on `domain` is explicitly granted
    pub fn allows(&self, domain: &str, action: CrudAction) -> bool {
        match self {
            Self::Wildcard(s) => s == "all",
            Self::Table(table) => table
                .get(domain)
                .and_then(|verbs| verbs.get(action.as_str()))
                .copied()
                .unwrap_or(false),
        }
    }
}

impl Default for PermissionSet {
    fn default() -> Self {
        Self::Table(HashMap::new())
    }
}

/// JWT authentication middleware
pub struct JwtAuthMiddleware {
    /// Decoding key (from the shared HMAC secret)
    decoding_key: DecodingKey,
    /// Validation configuration
    validation: Validation,
    /// Token prefix to strip (e.g. "Bearer ")
    token_prefix: String,
}

impl JwtAuthMiddleware {
    /// Create from the shared HMAC secret
    pub fn from_secret(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(GatewayError::Config(
                "JWT secret cannot be empty".to_string(),
            ));
        }

        let decoding_key = DecodingKey::from_secret(secret.as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.required_spec_claims = ["exp"].iter().map(|s| s.to_string()).collect();

        Ok(Self {
            decoding_key,
            validation,
            token_prefix: "Bearer ".to_string(),
        })
    }

    /// Validate a raw token string and return the claims
    pub fn validate_token(&self, token: &str) -> std::result::Result<Claims, String> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| format!("Token validation failed: {}", e))
    }

    /// Extract the token from a header value (strips "Bearer " prefix)
    pub fn extract_token<'a>(&self, header_value: &'a str) -> &'a str {
        header_value
            .strip_prefix(self.token_prefix.as_str())
            .unwrap_or(header_value)
    }

    fn unauthorized(message: &str) -> Response<Vec<u8>> {
        let body = serde_json::json!({ "error": message }).to_string();
        Response::builder()
            .status(401)
            .header("content-type", "application/json")
            .body(body.into_bytes())
            .unwrap()
    }
}

#[async_trait]
impl Middleware for JwtAuthMiddleware {
    async fn handle_request(
        &self,
        req: &mut http::request::Parts,
        _ctx: &RequestContext,
    ) -> Result<Option<Response<Vec<u8>>>> {
        let header_value = match req.headers.get(http::header::AUTHORIZATION) {
            Some(v) => match v.to_str() {
                Ok(s) => s.to_string(),
                Err(_) => {
                    return Ok(Some(Self::unauthorized("Invalid authorization header")));
                }
            },
            None => {
                return Ok(Some(Self::unauthorized("Missing authorization header")));
            }
        };

        let token = self.extract_token(&header_value);
        if token.is_empty() {
            return Ok(Some(Self::unauthorized("Missing token")));
        }

        match self.validate_token(token) {
            Ok(claims) => {
                req.extensions.insert(claims);
                Ok(None)
            }
            Err(e) => {
                tracing::debug!(error = %e, "JWT validation failed");
                Ok(Some(Self::unauthorized(&e)))
            }
        }
    }

    fn name(&self) -> &str {
        "jwt-auth"
    }
}
