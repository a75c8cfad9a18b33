// ============================================================================
// Middleware
// ============================================================================
//
// - request_logging: one structured log line per completed request
// - rate_limit: the first stage of the admission pipeline; rejects with 429
//   and stamps X-RateLimit-* headers on every response that passes
//
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;

use crate::context::GatewayContext;
use crate::error::GatewayError;
use crate::gateway::dispatcher::bearer_token;
use crate::ratelimit::Decision;

/// Derive the client identity used for rate limiting and logging.
///
/// Priority: explicit X-Client-Id header, then the first hop of
/// X-Forwarded-For, then the socket's remote address. The headers are
/// spoofable; in production a trusted reverse proxy must own them.
pub fn extract_client_id(headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
    if let Some(client_id) = headers.get("x-client-id").and_then(|v| v.to_str().ok()) {
        let client_id = client_id.trim();
        if !client_id.is_empty() {
            return client_id.to_string();
        }
    }

    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        let first_hop = forwarded.split(',').next().unwrap_or("").trim();
        if !first_hop.is_empty() {
            return first_hop.to_string();
        }
    }

    match remote {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}

/// Request logging middleware
pub async fn request_logging(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Request completed"
    );

    response
}

/// Rate limiting middleware, stage one of the pipeline.
///
/// The caller's role (for role-based budgets) comes from validating the
/// bearer token if one is present; an invalid token simply means the default
/// budget applies here, authentication itself is the dispatcher's job.
pub async fn rate_limit(
    State(ctx): State<Arc<GatewayContext>>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    ctx.stats.record_request();

    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client_id = extract_client_id(request.headers(), remote);
    let role = bearer_token(request.headers())
        .and_then(|token| ctx.tokens.validate(token))
        .map(|user| user.role);

    let path = request.uri().path();
    let decision = ctx.limiter.check(&client_id, path, role);

    if !decision.allowed {
        ctx.stats.record_rate_limited();
        tracing::warn!(
            client_id = %client_id,
            path = %path,
            rule = %decision.rule_key,
            limit = decision.limit,
            "Rate limit exceeded"
        );
        return Err(GatewayError::RateLimitExceeded {
            limit: decision.limit,
            reset_at: decision.reset_at,
            retry_after_secs: decision.reset_at - Utc::now().timestamp(),
        });
    }

    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &decision);
    Ok(response)
}

/// Quota headers go on every response, not only rejections
fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    if let Ok(v) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("x-ratelimit-limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.reset_at.to_string()) {
        headers.insert("x-ratelimit-reset", v);
    }
}
