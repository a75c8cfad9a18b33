// ============================================================================
// Authentication handlers
// ============================================================================

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::tokens::TokenPair;
use crate::auth::users::UserInfo;
use crate::context::GatewayContext;
use crate::error::GatewayError;
use crate::gateway::dispatcher::bearer_token;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Optional cross-check against the account's organization
    pub organization_code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub user: UserInfo,
}

impl AuthResponse {
    fn new(pair: TokenPair, user: UserInfo) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: pair.expires_in,
            user,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn login(
    State(ctx): State<Arc<GatewayContext>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, GatewayError> {
    let (pair, user) = ctx.tokens.authenticate(&req.username, &req.password)?;

    // An organization mismatch is reported exactly like a bad password so the
    // response does not leak which part of the credentials was wrong.
    if let Some(requested) = req.organization_code.as_deref() {
        if user.organization_code.as_deref() != Some(requested) {
            ctx.tokens.logout(&pair.access_token);
            return Err(GatewayError::InvalidCredentials);
        }
    }

    tracing::info!(username = %user.username, role = %user.role, "Login succeeded");
    Ok(Json(AuthResponse::new(pair, user)))
}

pub async fn refresh(
    State(ctx): State<Arc<GatewayContext>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, GatewayError> {
    let (pair, user) = ctx.tokens.refresh(&req.refresh_token)?;
    Ok(Json(AuthResponse::new(pair, user)))
}

pub async fn logout(
    State(ctx): State<Arc<GatewayContext>>,
    headers: HeaderMap,
) -> Result<Json<Value>, GatewayError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| GatewayError::BadRequest("Missing bearer token".to_string()))?;

    if !ctx.tokens.logout(token) {
        return Err(GatewayError::BadRequest("Unknown token".to_string()));
    }
    Ok(Json(json!({ "status": "ok" })))
}
