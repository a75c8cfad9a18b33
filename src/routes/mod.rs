// ============================================================================
// HTTP surface
// ============================================================================
//
// Route layout:
// - /health                      aggregated backend health (public)
// - /api/v1/auth/*               login, refresh, logout
// - /api/v1/admin/*              admin/ops surface (ADMIN role)
// - everything else              proxied through the dispatcher
//
// Middleware order (outermost first): trace, request logging, rate limiting.
// The rate-limit stage therefore runs before any handler, including auth and
// admin, and stamps X-RateLimit-* headers on every response.
//
// ============================================================================

pub mod admin;
pub mod auth;
pub mod extractors;
pub mod health;
pub mod middleware;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::context::GatewayContext;
use crate::gateway::dispatcher;

pub fn build_router(ctx: Arc<GatewayContext>) -> Router {
    Router::new()
        .route("/health", get(health::aggregate_health))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/refresh", post(auth::refresh))
        .route("/api/v1/auth/logout", post(auth::logout))
        .route("/api/v1/admin/users", post(admin::create_user))
        .route("/api/v1/admin/users/:user_id/lock", post(admin::lock_user))
        .route(
            "/api/v1/admin/users/:user_id/unlock",
            post(admin::unlock_user),
        )
        .route(
            "/api/v1/admin/rate-limit/reset/:client_id",
            post(admin::reset_rate_limit),
        )
        .route(
            "/api/v1/admin/rate-limit/block/:client_id",
            post(admin::block_client),
        )
        .route("/api/v1/admin/statistics", get(admin::statistics))
        // Everything else is proxied to the resolved backend
        .fallback(dispatcher::proxy_request)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(middleware::request_logging))
                .layer(axum::middleware::from_fn_with_state(
                    ctx.clone(),
                    middleware::rate_limit,
                ))
                .into_inner(),
        )
        .with_state(ctx)
}
