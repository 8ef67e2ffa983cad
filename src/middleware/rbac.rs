//! Permission filter — domain × CRUD-verb RBAC
//!
//! The HTTP method maps to a CRUD verb (GET→read, POST→create,
//! PUT/PATCH→update, DELETE→delete). A request is allowed when the token
//! carries `permissions[domain][verb] == true`, the wildcard "all", or the
//! super-admin role. Denials name the missing permission in the 403 body.

use crate::error::Result;
use crate::middleware::{Claims, Middleware, RequestContext};
use async_trait::async_trait;
use http::Response;
use serde::{Deserialize, Serialize};

/// CRUD verb derived from the inbound HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrudAction {
    Create,
    Read,
    Update,
    Delete,
}

impl CrudAction {
    /// Fixed method → verb table. Uncommon methods (HEAD, etc.) are
    /// treated as reads.
    pub fn from_method(method: &http::Method) -> Self {
        match *method {
            http::Method::POST => Self::Create,
            http::Method::PUT | http::Method::PATCH => Self::Update,
            http::Method::DELETE => Self::Delete,
            _ => Self::Read,
        }
    }

    /// Lowercase verb name used in permission tables and error bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for CrudAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of a permission check. Computed per request, never persisted.
#[derive(Debug, Clone)]
pub struct Decision {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Human-readable denial reason (None when allowed)
    pub reason: Option<String>,
}

impl Decision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Authorize `action` on `domain` for the given claims
pub fn authorize(
    claims: &Claims,
    domain: &str,
    action: CrudAction,
    super_admin_role: &str,
) -> Decision {
    if claims.role == super_admin_role {
        return Decision::allow();
    }
    if claims.permissions.allows(domain, action) {
        return Decision::allow();
    }
    Decision::deny(format!("{} access to {}", action, domain))
}

/// RBAC middleware — rejects requests lacking the required permission
pub struct RbacMiddleware {
    super_admin_role: String,
}

impl RbacMiddleware {
    /// Create with the configured super-admin role sentinel
    pub fn new(super_admin_role: impl Into<String>) -> Self {
        Self {
            super_admin_role: super_admin_role.into(),
        }
    }
}

#[async_trait]
impl Middleware for RbacMiddleware {
    async fn handle_request(
        &self,
        req: &mut http::request::Parts,
        ctx: &RequestContext,
    ) -> Result<Option<Response<Vec<u8>>>> {
        let claims = match req.extensions.get::<Claims>() {
            Some(claims) => claims,
            None => {
                // Fail closed: no verified identity on a gated route
                let body = serde_json::json!({ "error": "Authentication required" }).to_string();
                return Ok(Some(
                    Response::builder()
                        .status(401)
                        .header("content-type", "application/json")
                        .body(body.into_bytes())
                        .unwrap(),
                ));
            }
        };

        let decision = authorize(claims, &ctx.service, ctx.action, &self.super_admin_role);
        if decision.allowed {
            return Ok(None);
        }

        let required = decision.reason.unwrap_or_default();
        tracing::debug!(
            user = claims.sub,
            service = ctx.service,
            action = %ctx.action,
            "Permission denied"
        );
        let body = serde_json::json!({
            "error": "Insufficient permissions",
            "required": required,
            "domain": ctx.service,
            "action": ctx.action.as_str(),
        })
        .to_string();
        Ok(Some(
            Response::builder()
                .status(403)
                .header("content-type", "application/json")
                .body(body.into_bytes())
                .unwrap(),
        ))
    }

    fn name(&self) -> &str {
        "rbac"
    }
}
