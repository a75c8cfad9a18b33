// ============================================================================
// Gateway integration tests
// ============================================================================
//
// Each test boots a full gateway instance on an ephemeral port, plus a stub
// backend where forwarding matters. Tests talk to the gateway over real HTTP
// so the whole pipeline is exercised: middleware, auth, authorization,
// routing and forwarding.
//
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::{any, get};
use axum::{Json, Router};
use serde_json::{json, Value};

use credchain_gateway::config::{BackendConfig, Config, RateLimitConfig, SecurityConfig};
use credchain_gateway::context::GatewayContext;
use credchain_gateway::routes::build_router;

const SEED_PASSWORD: &str = "test-seed-password";

/// Stub backend: healthy, echoes everything, with one route that always
/// fails server-side.
async fn spawn_stub_backend() -> String {
    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/api/v1/degrees/boom",
            any(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "backend exploded") }),
        )
        .fallback(|req: axum::extract::Request| async move {
            Json(json!({
                "echo": true,
                "path": req.uri().path(),
                "method": req.method().as_str(),
            }))
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn test_config(backends: BackendConfig, requests_per_minute: u32) -> Config {
    Config {
        port: 0,
        rust_log: "warn".to_string(),
        token_issuer: "credchain-gateway-test".to_string(),
        upstream_timeout_secs: 5,
        health_probe_timeout_secs: 1,
        security: SecurityConfig {
            signing_secret: "integration-test-signing-secret-0123456789".to_string(),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 86400,
            max_failed_login_attempts: 5,
        },
        rate_limit: RateLimitConfig {
            enabled: true,
            default_requests_per_minute: requests_per_minute,
            window_secs: 60,
        },
        backends,
        seed_admin_password: SEED_PASSWORD.to_string(),
    }
}

fn uniform_backends(url: &str) -> BackendConfig {
    BackendConfig {
        attestation_url: url.to_string(),
        university_url: url.to_string(),
        employer_url: url.to_string(),
    }
}

/// Boot a gateway and return its base URL
async fn spawn_gateway(config: Config) -> String {
    let ctx = Arc::new(GatewayContext::new(Arc::new(config)).unwrap());
    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    format!("http://{}", addr)
}

async fn spawn_default_gateway() -> String {
    let upstream = spawn_stub_backend().await;
    spawn_gateway(test_config(uniform_backends(&upstream), 60)).await
}

async fn login(client: &reqwest::Client, base: &str, username: &str) -> Value {
    let response = client
        .post(format!("{}/api/v1/auth/login", base))
        .json(&json!({ "username": username, "password": SEED_PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK, "login({})", username);
    response.json().await.unwrap()
}

async fn access_token(client: &reqwest::Client, base: &str, username: &str) -> String {
    login(client, base, username).await["accessToken"]
        .as_str()
        .unwrap()
        .to_string()
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_login_then_proxy_succeeds() {
    let base = spawn_default_gateway().await;
    let client = reqwest::Client::new();

    let token = access_token(&client, &base, "university.registrar").await;

    let response = client
        .get(format!("{}/api/v1/degrees", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-ratelimit-limit"));
    assert!(response.headers().contains_key("x-ratelimit-remaining"));
    assert!(response.headers().contains_key("x-ratelimit-reset"));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["echo"], true);
    assert_eq!(body["path"], "/api/v1/degrees");
}

#[tokio::test]
async fn test_missing_and_garbage_tokens_are_rejected() {
    let base = spawn_default_gateway().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/v1/degrees", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(format!("{}/api/v1/degrees", base))
        .bearer_auth("not.a.token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized_without_detail() {
    let base = spawn_default_gateway().await;
    let client = reqwest::Client::new();

    // Unknown user and wrong password must produce identical envelopes
    let mut bodies = Vec::new();
    for (username, password) in [("admin", "wrong"), ("no-such-user", "wrong")] {
        let response = client
            .post(format!("{}/api/v1/auth/login", base))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        bodies.push(response.json::<Value>().await.unwrap());
    }
    assert_eq!(bodies[0], bodies[1]);
}

#[tokio::test]
async fn test_refresh_token_is_single_use() {
    let base = spawn_default_gateway().await;
    let client = reqwest::Client::new();

    let auth = login(&client, &base, "employer.hr").await;
    let refresh_token = auth["refreshToken"].as_str().unwrap();

    let response = client
        .post(format!("{}/api/v1/auth/refresh", base))
        .json(&json!({ "refreshToken": refresh_token }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rotated: Value = response.json().await.unwrap();
    assert_ne!(rotated["refreshToken"], auth["refreshToken"]);

    // The spent token is gone
    let response = client
        .post(format!("{}/api/v1/auth/refresh", base))
        .json(&json!({ "refreshToken": refresh_token }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_tears_down_the_session() {
    let base = spawn_default_gateway().await;
    let client = reqwest::Client::new();

    let token = access_token(&client, &base, "university.registrar").await;

    let response = client
        .post(format!("{}/api/v1/auth/logout", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .get(format!("{}/api/v1/degrees", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_without_token_is_bad_request() {
    let base = spawn_default_gateway().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/v1/auth/logout", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_employer_cannot_write_degree_records() {
    let base = spawn_default_gateway().await;
    let client = reqwest::Client::new();

    let token = access_token(&client, &base, "employer.hr").await;

    let response = client
        .post(format!("{}/api/v1/degrees", base))
        .bearer_auth(&token)
        .json(&json!({ "degree": "forged" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Reading the same records is fine
    let response = client
        .get(format!("{}/api/v1/degrees", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_public_verification_needs_no_token() {
    let base = spawn_default_gateway().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/v1/verifications/public/deg-123", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Writes to the public prefix still require a token
    let response = client
        .post(format!("{}/api/v1/verifications/public/deg-123", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Routing and forwarding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unknown_prefix_is_not_found() {
    let base = spawn_default_gateway().await;
    let client = reqwest::Client::new();

    let token = access_token(&client, &base, "admin").await;

    let response = client
        .get(format!("{}/api/v1/telemetry", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upstream_server_error_becomes_bad_gateway() {
    let base = spawn_default_gateway().await;
    let client = reqwest::Client::new();

    let token = access_token(&client, &base, "admin").await;

    let response = client
        .get(format!("{}/api/v1/degrees/boom", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_unreachable_upstream_becomes_service_unavailable() {
    // Nothing listens on this port
    let config = test_config(uniform_backends("http://127.0.0.1:1"), 60);
    let base = spawn_gateway(config).await;
    let client = reqwest::Client::new();

    let token = access_token(&client, &base, "admin").await;

    let response = client
        .get(format!("{}/api/v1/degrees", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_upstream_4xx_passes_through_verbatim() {
    let upstream = spawn_stub_backend().await;
    let base = spawn_gateway(test_config(uniform_backends(&upstream), 60)).await;
    let client = reqwest::Client::new();

    let token = access_token(&client, &base, "admin").await;

    // The stub echoes 200 for everything except /boom, so exercise 4xx via
    // a helper route on a second stub
    let app = Router::new().route(
        "/api/v1/degrees/missing",
        get(|| async { (StatusCode::NOT_FOUND, "no such degree") }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let strict_base = spawn_gateway(test_config(
        uniform_backends(&format!("http://{}", addr)),
        60,
    ))
    .await;
    let strict_token = access_token(&client, &strict_base, "admin").await;

    let response = client
        .get(format!("{}/api/v1/degrees/missing", strict_base))
        .bearer_auth(&strict_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.text().await.unwrap(), "no such degree");

    // Keep the first gateway exercised so its token path is covered too
    let response = client
        .get(format!("{}/api/v1/degrees", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_default_budget_trips_with_retry_after() {
    let upstream = spawn_stub_backend().await;
    let base = spawn_gateway(test_config(uniform_backends(&upstream), 3)).await;
    let client = reqwest::Client::new();

    let token = access_token(&client, &base, "employer.hr").await;

    for i in 0..3 {
        let response = client
            .get(format!("{}/api/v1/degrees", base))
            .bearer_auth(&token)
            .header("x-client-id", "portal-1")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "request {}", i);
    }

    let response = client
        .get(format!("{}/api/v1/degrees", base))
        .bearer_auth(&token)
        .header("x-client-id", "portal-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");

    // A different client still has its own budget
    let response = client
        .get(format!("{}/api/v1/degrees", base))
        .bearer_auth(&token)
        .header("x-client-id", "portal-2")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_reports_degraded_backend() {
    let live = spawn_stub_backend().await;
    let config = test_config(
        BackendConfig {
            attestation_url: live.clone(),
            university_url: live,
            employer_url: "http://127.0.0.1:1".to_string(),
        },
        60,
    );
    let base = spawn_gateway(config).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "DEGRADED");
    assert_eq!(body["services"]["attestation-service"], "UP");
    assert_eq!(body["services"]["employer-service"], "DOWN");
}

// ---------------------------------------------------------------------------
// Admin surface
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_statistics_are_admin_only() {
    let base = spawn_default_gateway().await;
    let client = reqwest::Client::new();

    let admin = access_token(&client, &base, "admin").await;
    let employer = access_token(&client, &base, "employer.hr").await;

    let response = client
        .get(format!("{}/api/v1/admin/statistics", base))
        .bearer_auth(&employer)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .get(format!("{}/api/v1/admin/statistics", base))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert!(body["requests"]["totalRequests"].as_u64().unwrap() > 0);
    assert!(body["users"]["total"].as_u64().unwrap() >= 4);
}

#[tokio::test]
async fn test_admin_creates_a_user_who_can_log_in() {
    let base = spawn_default_gateway().await;
    let client = reqwest::Client::new();

    let admin = access_token(&client, &base, "admin").await;

    let response = client
        .post(format!("{}/api/v1/admin/users", base))
        .bearer_auth(&admin)
        .json(&json!({
            "username": "mit.registrar",
            "password": "a-strong-password",
            "role": "UNIVERSITY",
            "organizationCode": "UNI-02",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["role"], "UNIVERSITY");

    // Duplicate usernames are rejected
    let response = client
        .post(format!("{}/api/v1/admin/users", base))
        .bearer_auth(&admin)
        .json(&json!({
            "username": "mit.registrar",
            "password": "another-password",
            "role": "UNIVERSITY",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("{}/api/v1/auth/login", base))
        .json(&json!({ "username": "mit.registrar", "password": "a-strong-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_locking_a_user_revokes_their_tokens() {
    let base = spawn_default_gateway().await;
    let client = reqwest::Client::new();

    let admin = access_token(&client, &base, "admin").await;
    let auth = login(&client, &base, "employer.hr").await;
    let employer_token = auth["accessToken"].as_str().unwrap();
    let employer_id = auth["user"]["id"].as_str().unwrap();

    let response = client
        .post(format!("{}/api/v1/admin/users/{}/lock", base, employer_id))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Existing tokens are dead immediately
    let response = client
        .get(format!("{}/api/v1/verifications", base))
        .bearer_auth(employer_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // And new logins report the lock
    let response = client
        .post(format!("{}/api/v1/auth/login", base))
        .json(&json!({ "username": "employer.hr", "password": SEED_PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "ACCOUNT_LOCKED");

    // Unlock restores access
    let response = client
        .post(format!("{}/api/v1/admin/users/{}/unlock", base, employer_id))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .post(format!("{}/api/v1/auth/login", base))
        .json(&json!({ "username": "employer.hr", "password": SEED_PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_resets_a_tripped_limit() {
    let upstream = spawn_stub_backend().await;
    let base = spawn_gateway(test_config(uniform_backends(&upstream), 2)).await;
    let client = reqwest::Client::new();

    let admin = access_token(&client, &base, "admin").await;
    let token = access_token(&client, &base, "employer.hr").await;

    for _ in 0..2 {
        client
            .get(format!("{}/api/v1/degrees", base))
            .bearer_auth(&token)
            .header("x-client-id", "portal-9")
            .send()
            .await
            .unwrap();
    }
    let response = client
        .get(format!("{}/api/v1/degrees", base))
        .bearer_auth(&token)
        .header("x-client-id", "portal-9")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = client
        .post(format!("{}/api/v1/admin/rate-limit/reset/portal-9", base))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .get(format!("{}/api/v1/degrees", base))
        .bearer_auth(&token)
        .header("x-client-id", "portal-9")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_blocks_a_client_outright() {
    let base = spawn_default_gateway().await;
    let client = reqwest::Client::new();

    let admin = access_token(&client, &base, "admin").await;
    let token = access_token(&client, &base, "university.registrar").await;

    let response = client
        .post(format!("{}/api/v1/admin/rate-limit/block/rogue-bot", base))
        .bearer_auth(&admin)
        .json(&json!({ "durationMinutes": 10 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .get(format!("{}/api/v1/degrees", base))
        .bearer_auth(&token)
        .header("x-client-id", "rogue-bot")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}
