// ============================================================================
// Dispatcher
// ============================================================================
//
// The per-request admission pipeline for proxied traffic. The rate-limit
// stage runs in middleware before this handler; here the order is strictly
// authentication -> authorization -> route resolution -> forwarding. Each
// stage either passes the request on or rejects it with the matching status;
// there is no backtracking and no silent retry.
//
// ============================================================================

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, Method, Response};

use crate::auth::users::UserInfo;
use crate::context::GatewayContext;
use crate::error::GatewayError;
use crate::gateway::authz;

/// Paths servable without a token: login, refresh, health and the public
/// credential verification endpoint (read-only).
pub fn is_public_path(method: &Method, path: &str) -> bool {
    matches!(path, "/health" | "/api/v1/auth/login" | "/api/v1/auth/refresh")
        || (path.starts_with("/api/v1/verifications/public")
            && matches!(*method, Method::GET | Method::HEAD))
}

/// Pull the bearer token out of the Authorization header, if any
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Fallback handler: everything that is not an auth, health or admin route
/// lands here and is proxied to the resolved backend.
pub async fn proxy_request(
    State(ctx): State<Arc<GatewayContext>>,
    request: Request,
) -> Result<Response<Body>, GatewayError> {
    let path = request.uri().path().to_string();
    let method = request.method().clone();

    // ---- Authentication (skipped for public paths) ----
    let caller: Option<UserInfo> = if is_public_path(&method, &path) {
        None
    } else {
        let token = bearer_token(request.headers()).ok_or_else(|| {
            ctx.stats.record_unauthenticated();
            GatewayError::Unauthenticated
        })?;
        let info = ctx.tokens.validate(token).ok_or_else(|| {
            ctx.stats.record_unauthenticated();
            GatewayError::TokenExpiredOrUnknown
        })?;

        // ---- Authorization ----
        if !authz::is_allowed(info.role, &method, &path) {
            ctx.stats.record_forbidden();
            tracing::warn!(
                user_id = %info.id,
                role = %info.role,
                method = %method,
                path = %path,
                "Authorization denied"
            );
            return Err(GatewayError::Forbidden);
        }
        Some(info)
    };

    // ---- Route resolution ----
    let (service, base_url) = match ctx.routes.resolve(&path) {
        Some(route) => (route.service, route.base_url.clone()),
        None => {
            ctx.stats.record_no_route();
            return Err(GatewayError::NoRouteForPath(path));
        }
    };

    // ---- Forwarding ----
    let query = request.uri().query().map(str::to_string);
    let headers = request.headers().clone();
    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|e| {
            ctx.stats.record_internal_error();
            GatewayError::Internal(format!("failed reading request body: {}", e))
        })?;

    let result = ctx
        .client
        .forward(service, &base_url, &path, query.as_deref(), method, headers, body)
        .await;

    match result {
        Ok(response) => {
            ctx.stats.record_forwarded();
            tracing::debug!(
                service = %service,
                path = %path,
                status = %response.status().as_u16(),
                user_id = ?caller.as_ref().map(|c| c.id),
                "Request forwarded"
            );
            Ok(response)
        }
        Err(err) => {
            match err {
                GatewayError::UpstreamUnavailable { .. } => ctx.stats.record_upstream_failure(),
                _ => ctx.stats.record_internal_error(),
            }
            Err(err)
        }
    }
}
