use anyhow::Result;

// ============================================================================
// Configuration Constants
// ============================================================================

const DEFAULT_PORT: u16 = 8080;

// Default token lifetimes
const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 3600; // 1 hour
const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = 30 * 86400; // 30 days

// Default rate limiting budget
const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;
const DEFAULT_WINDOW_SECS: i64 = 60;

// Upstream call deadlines
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;
const DEFAULT_HEALTH_PROBE_TIMEOUT_SECS: u64 = 2;

// Failed-login lockout threshold
const DEFAULT_MAX_FAILED_LOGIN_ATTEMPTS: u32 = 5;

pub const SECONDS_PER_MINUTE: i64 = 60;
pub const SECONDS_PER_DAY: i64 = 86400;

// ============================================================================
// Configuration Structures
// ============================================================================

/// Backend base URLs the gateway forwards to
#[derive(Clone, Debug)]
pub struct BackendConfig {
    /// Governance / attestation service
    pub attestation_url: String,
    /// University records service
    pub university_url: String,
    /// Employer / verification service
    pub employer_url: String,
}

/// Rate limiting policies
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    /// Master switch; when false every request is admitted
    pub enabled: bool,
    /// Default budget for the fixed window
    pub default_requests_per_minute: u32,
    /// Window duration for the default rule (seconds)
    pub window_secs: i64,
}

/// Security and token policies
#[derive(Clone, Debug)]
pub struct SecurityConfig {
    /// HS256 signing secret for issued tokens
    pub signing_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub max_failed_login_attempts: u32,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub token_issuer: String,
    /// Timeout for forwarded upstream calls (seconds)
    pub upstream_timeout_secs: u64,
    /// Timeout for each backend health probe (seconds)
    pub health_probe_timeout_secs: u64,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub backends: BackendConfig,
    /// Password for the seeded bootstrap admin account
    pub seed_admin_password: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let signing_secret = std::env::var("GATEWAY_SIGNING_SECRET")?;
        if signing_secret.len() < 32 {
            anyhow::bail!(
                "GATEWAY_SIGNING_SECRET must be at least 32 characters long. \
                 Generate one with: openssl rand -base64 32"
            );
        }

        let backends = BackendConfig {
            attestation_url: backend_url_from_env(
                "ATTESTATION_SERVICE_URL",
                "http://localhost:8081",
            )?,
            university_url: backend_url_from_env(
                "UNIVERSITY_SERVICE_URL",
                "http://localhost:8082",
            )?,
            employer_url: backend_url_from_env("EMPLOYER_SERVICE_URL", "http://localhost:8083")?,
        };

        Ok(Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            token_issuer: std::env::var("TOKEN_ISSUER")
                .unwrap_or_else(|_| "credchain-gateway".to_string()),
            upstream_timeout_secs: std::env::var("UPSTREAM_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            health_probe_timeout_secs: std::env::var("HEALTH_PROBE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_HEALTH_PROBE_TIMEOUT_SECS),
            security: SecurityConfig {
                signing_secret,
                access_token_ttl_secs: std::env::var("ACCESS_TOKEN_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_ACCESS_TOKEN_TTL_SECS),
                refresh_token_ttl_secs: std::env::var("REFRESH_TOKEN_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_REFRESH_TOKEN_TTL_SECS),
                max_failed_login_attempts: std::env::var("MAX_FAILED_LOGIN_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_MAX_FAILED_LOGIN_ATTEMPTS),
            },
            rate_limit: RateLimitConfig {
                enabled: std::env::var("RATE_LIMITING_ENABLED")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .unwrap_or(true),
                default_requests_per_minute: std::env::var("DEFAULT_REQUESTS_PER_MINUTE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_REQUESTS_PER_MINUTE),
                window_secs: std::env::var("RATE_LIMIT_WINDOW_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_WINDOW_SECS),
            },
            backends,
            seed_admin_password: {
                let password = std::env::var("GATEWAY_ADMIN_PASSWORD")
                    .unwrap_or_else(|_| "change-me-admin".to_string());
                if password == "change-me-admin" {
                    tracing::warn!(
                        "GATEWAY_ADMIN_PASSWORD is not set, using insecure default. \
                         Set it before exposing the gateway."
                    );
                }
                password
            },
        })
    }
}

/// Read a backend base URL from the environment and validate it.
///
/// A malformed URL is a fatal startup error: every forwarded request would
/// fail, so refusing to start is the safer behavior.
fn backend_url_from_env(var: &str, default: &str) -> Result<String> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    let parsed: reqwest::Url = raw
        .parse()
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL ({}): {}", var, raw, e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("{} must be an http(s) URL, got: {}", var, raw);
    }
    // Strip any trailing slash so route joining stays predictable
    Ok(raw.trim_end_matches('/').to_string())
}
