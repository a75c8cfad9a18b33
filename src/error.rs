use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway error type covering every user-facing failure of the admission
/// pipeline plus internal faults.
///
/// Expected outcomes (bad credentials, quota exhaustion, missing routes) are
/// ordinary values of this enum, not panics; anything unanticipated collapses
/// into `Internal` and is reported to the caller without detail.
#[derive(Error, Debug)]
pub enum GatewayError {
    // ===== Authentication =====
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("account is locked")]
    AccountLocked,

    #[error("token is expired or unknown")]
    TokenExpiredOrUnknown,

    #[error("authentication required")]
    Unauthenticated,

    // ===== Authorization =====
    #[error("access denied for this resource")]
    Forbidden,

    // ===== Rate limiting =====
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded {
        limit: u32,
        /// Unix timestamp (seconds) when the current window resets
        reset_at: i64,
        retry_after_secs: i64,
    },

    // ===== Request validation =====
    #[error("bad request: {0}")]
    BadRequest(String),

    // ===== Routing & upstream =====
    #[error("no backend mapping for path: {0}")]
    NoRouteForPath(String),

    #[error("upstream service unavailable: {reason}")]
    UpstreamUnavailable { reason: String, gateway_timeout: bool },

    // ===== Internal =====
    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidCredentials
            | GatewayError::AccountLocked
            | GatewayError::TokenExpiredOrUnknown
            | GatewayError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden => StatusCode::FORBIDDEN,
            GatewayError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NoRouteForPath(_) => StatusCode::NOT_FOUND,
            GatewayError::UpstreamUnavailable {
                gateway_timeout, ..
            } => {
                if *gateway_timeout {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::BAD_GATEWAY
                }
            }
            GatewayError::Internal(_) | GatewayError::Unknown(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::InvalidCredentials => "INVALID_CREDENTIALS",
            GatewayError::AccountLocked => "ACCOUNT_LOCKED",
            GatewayError::TokenExpiredOrUnknown => "TOKEN_EXPIRED_OR_UNKNOWN",
            GatewayError::Unauthenticated => "UNAUTHENTICATED",
            GatewayError::Forbidden => "FORBIDDEN",
            GatewayError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            GatewayError::BadRequest(_) => "BAD_REQUEST",
            GatewayError::NoRouteForPath(_) => "NO_ROUTE_FOR_PATH",
            GatewayError::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
            GatewayError::Internal(_) | GatewayError::Unknown(_) => "INTERNAL_ERROR",
        }
    }

    /// Caller-safe message. Internal errors never leak detail here;
    /// the full context goes to the server-side log only.
    pub fn user_message(&self) -> String {
        match self {
            // Unknown user and wrong password collapse into one message so the
            // endpoint cannot be used for username enumeration.
            GatewayError::InvalidCredentials => "Invalid username or password".to_string(),
            GatewayError::AccountLocked => {
                "Account is locked due to repeated failed logins".to_string()
            }
            GatewayError::TokenExpiredOrUnknown => "Token is expired or invalid".to_string(),
            GatewayError::Unauthenticated => "Authentication required".to_string(),
            GatewayError::Forbidden => "You do not have access to this resource".to_string(),
            GatewayError::RateLimitExceeded {
                limit,
                retry_after_secs,
                ..
            } => format!(
                "Rate limit of {} requests exceeded. Retry in {} seconds.",
                limit, retry_after_secs
            ),
            GatewayError::BadRequest(msg) => msg.clone(),
            GatewayError::NoRouteForPath(path) => format!("No backend mapping for {}", path),
            GatewayError::UpstreamUnavailable { .. } => {
                "Upstream service is unavailable".to_string()
            }
            GatewayError::Internal(_) | GatewayError::Unknown(_) => {
                "Internal server error".to_string()
            }
        }
    }

    /// Log this error with a level appropriate to its severity
    pub fn log(&self) {
        let status = self.status_code();
        let code = self.error_code();

        if status.is_server_error() {
            tracing::error!(
                error = %self,
                error_code = %code,
                status = %status.as_u16(),
                "Request failed"
            );
        } else if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(error = %self, error_code = %code, "Authentication failed");
        } else {
            tracing::debug!(error = %self, error_code = %code, "Request rejected");
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        self.log();

        let status = self.status_code();
        let body = json!({
            "error": self.user_message(),
            "error_code": self.error_code(),
            "status": status.as_u16(),
        });

        let mut response = (status, Json(body)).into_response();

        // 429 responses always carry the reset so well-behaved clients can
        // back off deterministically
        if let GatewayError::RateLimitExceeded {
            limit,
            reset_at,
            retry_after_secs,
        } = self
        {
            let headers = response.headers_mut();
            if let Ok(v) = limit.to_string().parse() {
                headers.insert("x-ratelimit-limit", v);
            }
            if let Ok(v) = "0".parse() {
                headers.insert("x-ratelimit-remaining", v);
            }
            if let Ok(v) = reset_at.to_string().parse() {
                headers.insert("x-ratelimit-reset", v);
            }
            if let Ok(v) = retry_after_secs.max(0).to_string().parse() {
                headers.insert("retry-after", v);
            }
        }

        response
    }
}
