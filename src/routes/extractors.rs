use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth::users::UserInfo;
use crate::context::GatewayContext;
use crate::error::GatewayError;
use crate::gateway::dispatcher::bearer_token;

/// Extractor for handlers that require a valid access token. Rejection is a
/// 401 with the usual error envelope; malformed and revoked tokens are
/// indistinguishable from absent ones.
pub struct AuthenticatedUser(pub UserInfo);

#[async_trait]
impl FromRequestParts<Arc<GatewayContext>> for AuthenticatedUser {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &Arc<GatewayContext>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(GatewayError::Unauthenticated)?;
        let info = ctx
            .tokens
            .validate(token)
            .ok_or(GatewayError::TokenExpiredOrUnknown)?;
        Ok(AuthenticatedUser(info))
    }
}
