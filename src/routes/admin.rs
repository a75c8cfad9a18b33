// ============================================================================
// Admin surface
// ============================================================================
//
// Everything here requires a valid access token with the ADMIN role. The
// handlers only orchestrate; the actual state changes live in the token
// manager, the user store and the rate limiter.
//
// ============================================================================

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::users::{Role, User, UserInfo};
use crate::context::GatewayContext;
use crate::error::GatewayError;
use crate::routes::extractors::AuthenticatedUser;

fn require_admin(user: &UserInfo) -> Result<(), GatewayError> {
    if user.role != Role::Admin {
        return Err(GatewayError::Forbidden);
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub role: Role,
    pub organization_code: Option<String>,
}

pub async fn create_user(
    State(ctx): State<Arc<GatewayContext>>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserInfo>), GatewayError> {
    require_admin(&admin)?;

    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(GatewayError::BadRequest(
            "Username and password are required".to_string(),
        ));
    }
    let store = ctx.tokens.store();
    if store.get_by_username(&req.username).is_some() {
        return Err(GatewayError::BadRequest(format!(
            "Username already exists: {}",
            req.username
        )));
    }

    let hash = bcrypt::hash(&req.password, bcrypt::DEFAULT_COST)
        .map_err(|e| GatewayError::Internal(format!("Password hashing failed: {}", e)))?;
    let user = User::new(req.username, hash, req.role, req.organization_code);
    let info = UserInfo::from(&user);
    store.put(user);

    tracing::info!(
        admin = %admin.username,
        username = %info.username,
        role = %info.role,
        "User created"
    );
    Ok((StatusCode::CREATED, Json(info)))
}

pub async fn lock_user(
    State(ctx): State<Arc<GatewayContext>>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>, GatewayError> {
    require_admin(&admin)?;

    if !ctx.tokens.lock_user(user_id) {
        return Err(GatewayError::BadRequest(format!(
            "Unknown user: {}",
            user_id
        )));
    }
    tracing::warn!(admin = %admin.username, user_id = %user_id, "User locked");
    Ok(Json(json!({ "status": "locked", "userId": user_id })))
}

pub async fn unlock_user(
    State(ctx): State<Arc<GatewayContext>>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>, GatewayError> {
    require_admin(&admin)?;

    if !ctx.tokens.unlock_user(user_id) {
        return Err(GatewayError::BadRequest(format!(
            "Unknown user: {}",
            user_id
        )));
    }
    tracing::info!(admin = %admin.username, user_id = %user_id, "User unlocked");
    Ok(Json(json!({ "status": "unlocked", "userId": user_id })))
}

pub async fn reset_rate_limit(
    State(ctx): State<Arc<GatewayContext>>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Path(client_id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    require_admin(&admin)?;

    let cleared = ctx.limiter.reset_client(&client_id);
    tracing::info!(
        admin = %admin.username,
        client_id = %client_id,
        cleared,
        "Rate-limit state reset"
    );
    Ok(Json(json!({
        "status": "reset",
        "clientId": client_id,
        "windowsCleared": cleared,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockClientRequest {
    pub duration_minutes: i64,
}

pub async fn block_client(
    State(ctx): State<Arc<GatewayContext>>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Path(client_id): Path<String>,
    Json(req): Json<BlockClientRequest>,
) -> Result<Json<Value>, GatewayError> {
    require_admin(&admin)?;

    if req.duration_minutes <= 0 {
        return Err(GatewayError::BadRequest(
            "durationMinutes must be positive".to_string(),
        ));
    }
    ctx.limiter.block_client(&client_id, req.duration_minutes);
    tracing::warn!(
        admin = %admin.username,
        client_id = %client_id,
        minutes = req.duration_minutes,
        "Client blocked"
    );
    Ok(Json(json!({
        "status": "blocked",
        "clientId": client_id,
        "durationMinutes": req.duration_minutes,
    })))
}

pub async fn statistics(
    State(ctx): State<Arc<GatewayContext>>,
    AuthenticatedUser(admin): AuthenticatedUser,
) -> Result<Json<Value>, GatewayError> {
    require_admin(&admin)?;

    let (access_tokens, refresh_tokens) = ctx.tokens.live_token_counts();
    let users = ctx.tokens.store().list();
    let locked = users.iter().filter(|u| u.locked).count();

    Ok(Json(json!({
        "requests": ctx.stats.snapshot(),
        "rateLimiter": {
            "activeWindows": ctx.limiter.active_windows(),
            "blockedClients": ctx.limiter.blocked_clients(),
        },
        "tokens": {
            "liveAccessTokens": access_tokens,
            "liveRefreshTokens": refresh_tokens,
        },
        "users": {
            "total": users.len(),
            "locked": locked,
        },
    })))
}
