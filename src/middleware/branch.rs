//! Branch isolation middleware — multi-location data boundary
//!
//! The requested branch comes from the `branchId` query parameter, falling
//! back to the token's own branch claim. The request is rejected when the
//! branch is not in the user's allowed set (configured assignments plus the
//! token branch). The super-admin role bypasses the check. An unresolved
//! user context is rejected with 401 rather than downgraded to a guest.

use crate::error::Result;
use crate::middleware::{Claims, Middleware, RequestContext};
use async_trait::async_trait;
use http::Response;
use std::collections::HashMap;

/// Branch isolation middleware
pub struct BranchMiddleware {
    /// user id → branch ids from configuration
    assignments: HashMap<String, Vec<i64>>,
    super_admin_role: String,
}

impl BranchMiddleware {
    /// Create from the configured assignment table
    pub fn new(assignments: HashMap<String, Vec<i64>>, super_admin_role: impl Into<String>) -> Self {
        Self {
            assignments,
            super_admin_role: super_admin_role.into(),
        }
    }

    /// Whether `branch` is in the user's allowed set
    fn branch_allowed(&self, claims: &Claims, branch: i64) -> bool {
        if claims.branch_id == Some(branch) {
            return true;
        }
        self.assignments
            .get(&claims.sub)
            .map(|branches| branches.contains(&branch))
            .unwrap_or(false)
    }
}

/// Extract a `branchId` value from a raw query string
fn branch_from_query(query: &str) -> Option<i64> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key == "branchId" {
            value.parse().ok()
        } else {
            None
        }
    })
}

#[async_trait]
impl Middleware for BranchMiddleware {
    async fn handle_request(
        &self,
        req: &mut http::request::Parts,
        _ctx: &RequestContext,
    ) -> Result<Option<Response<Vec<u8>>>> {
        let claims = match req.extensions.get::<Claims>() {
            Some(claims) => claims,
            None => {
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

        if claims.role == self.super_admin_role {
            return Ok(None);
        }

        let requested = req
            .uri
            .query()
            .and_then(branch_from_query)
            .or(claims.branch_id);

        // No branch in play — nothing to isolate
        let branch = match requested {
            Some(branch) => branch,
            None => return Ok(None),
        };

        if self.branch_allowed(claims, branch) {
            return Ok(None);
        }

        tracing::debug!(user = claims.sub, branch, "Branch access denied");
        let body = serde_json::json!({
            "error": "Branch access denied",
            "branch": branch,
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
        "branch-isolation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{CrudAction, PermissionSet};

    fn make_claims(sub: &str, role: &str, branch_id: Option<i64>) -> Claims {
        Claims {
            sub: sub.to_string(),
            role: role.to_string(),
            assigned_app: None,
            branch_id,
            permissions: PermissionSet::all(),
            exp: 99999999999,
            iat: 0,
        }
    }

    fn make_ctx() -> RequestContext {
        RequestContext {
            client_ip: "127.0.0.1".to_string(),
            service: "orders".to_string(),
            action: CrudAction::Read,
        }
    }

    fn make_mw(assignments: Vec<(&str, Vec<i64>)>) -> BranchMiddleware {
        let table = assignments
            .into_iter()
            .map(|(user, branches)| (user.to_string(), branches))
            .collect();
        BranchMiddleware::new(table, "super_admin")
    }

    async fn run(
        mw: &BranchMiddleware,
        uri: &str,
        claims: Option<Claims>,
    ) -> Option<Response<Vec<u8>>> {
        let (mut parts, _) = http::Request::builder()
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts();
        if let Some(claims) = claims {
            parts.extensions.insert(claims);
        }
        mw.handle_request(&mut parts, &make_ctx()).await.unwrap()
    }

    #[test]
    fn test_branch_from_query() {
        assert_eq!(branch_from_query("branchId=3"), Some(3));
        assert_eq!(branch_from_query("page=1&branchId=7&size=10"), Some(7));
        assert_eq!(branch_from_query("branchId=abc"), None);
        assert_eq!(branch_from_query("other=1"), None);
        assert_eq!(branch_from_query(""), None);
    }

    #[tokio::test]
    async fn test_no_claims_is_401() {
        let mw = make_mw(vec![]);
        let resp = run(&mw, "/api/orders?branchId=1", None).await.unwrap();
        assert_eq!(resp.status(), 401);
    }

    #[tokio::test]
    async fn test_super_admin_bypasses() {
        let mw = make_mw(vec![]);
        let claims = make_claims("admin-1", "super_admin", None);
        let resp = run(&mw, "/api/orders?branchId=42", Some(claims)).await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn test_own_branch_allowed() {
        let mw = make_mw(vec![]);
        let claims = make_claims("user-1", "store_manager", Some(2));
        let resp = run(&mw, "/api/orders?branchId=2", Some(claims)).await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn test_assigned_branch_allowed() {
        let mw = make_mw(vec![("user-1", vec![1, 2, 3])]);
        let claims = make_claims("user-1", "store_manager", Some(1));
        let resp = run(&mw, "/api/orders?branchId=3", Some(claims)).await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn test_unassigned_branch_denied() {
        let mw = make_mw(vec![("user-1", vec![1, 2])]);
        let claims = make_claims("user-1", "store_manager", Some(1));
        let resp = run(&mw, "/api/orders?branchId=9", Some(claims)).await.unwrap();
        assert_eq!(resp.status(), 403);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["error"], "Branch access denied");
        assert_eq!(body["branch"], 9);
    }

    #[tokio::test]
    async fn test_token_branch_used_when_query_absent() {
        // The token's own branch is always in the allowed set
        let mw = make_mw(vec![]);
        let claims = make_claims("user-1", "store_manager", Some(5));
        let resp = run(&mw, "/api/orders", Some(claims)).await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn test_no_branch_context_passes() {
        let mw = make_mw(vec![]);
        let claims = make_claims("user-1", "store_manager", None);
        let resp = run(&mw, "/api/orders", Some(claims)).await;
        assert!(resp.is_none());
    }

    #[test]
    fn test_name() {
        assert_eq!(make_mw(vec![]).name(), "branch-isolation");
    }
}
