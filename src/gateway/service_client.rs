// ============================================================================
// Service client
// ============================================================================
//
// HTTP client for the backends. Forwards the original method, headers and
// body; reassembles the backend's response for the caller. Upstream 4xx
// responses pass through verbatim because they are the backend talking to
// the caller; 5xx, timeouts and connection failures become a gateway-level
// UpstreamUnavailable so the dispatcher can answer 502/503. Failed calls are
// never retried here: forwarded requests may be non-idempotent submissions.
//
// ============================================================================

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Method, Response, StatusCode};
use serde::Serialize;

use crate::error::GatewayError;
use crate::gateway::router::BackendService;

/// Health of one backend as seen from the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceHealth {
    Up,
    Down,
}

pub struct ServiceClient {
    client: reqwest::Client,
    health_probe_timeout: Duration,
}

impl ServiceClient {
    pub fn new(upstream_timeout_secs: u64, health_probe_timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(upstream_timeout_secs))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            client,
            health_probe_timeout: Duration::from_secs(health_probe_timeout_secs),
        })
    }

    /// Forward a request to `base_url + path` and reassemble the response.
    ///
    /// Dropping the returned future aborts the in-flight upstream call, so a
    /// caller disconnect does not leave work running.
    pub async fn forward(
        &self,
        service: BackendService,
        base_url: &str,
        path: &str,
        query: Option<&str>,
        method: Method,
        headers: HeaderMap,
        body: axum::body::Bytes,
    ) -> Result<Response<Body>, GatewayError> {
        let target_url = match query {
            Some(query) => format!("{}{}?{}", base_url, path, query),
            None => format!("{}{}", base_url, path),
        };

        let mut upstream_request = self.client.request(method, &target_url);

        // Host must reflect the target, not the gateway
        for (key, value) in headers.iter() {
            if key != "host" {
                upstream_request = upstream_request.header(key, value);
            }
        }

        if !body.is_empty() {
            upstream_request = upstream_request.body(body);
        }

        let upstream_response = upstream_request.send().await.map_err(|e| {
            tracing::error!(
                service = %service,
                target_url = %target_url,
                error = %e,
                "Upstream call failed"
            );
            GatewayError::UpstreamUnavailable {
                reason: if e.is_timeout() {
                    "upstream call timed out".to_string()
                } else {
                    "upstream unreachable".to_string()
                },
                gateway_timeout: true,
            }
        })?;

        let status = upstream_response.status();
        if status.is_server_error() {
            tracing::error!(
                service = %service,
                target_url = %target_url,
                status = %status.as_u16(),
                "Upstream returned server error"
            );
            return Err(GatewayError::UpstreamUnavailable {
                reason: format!("upstream answered HTTP {}", status.as_u16()),
                gateway_timeout: false,
            });
        }

        // 2xx/3xx/4xx pass through verbatim, headers and body included
        let mut response = Response::builder().status(status);
        for (key, value) in upstream_response.headers().iter() {
            response = response.header(key, value);
        }

        let body_bytes = upstream_response
            .bytes()
            .await
            .map_err(|e| GatewayError::UpstreamUnavailable {
                reason: format!("failed reading upstream body: {}", e),
                gateway_timeout: false,
            })?;

        response
            .body(Body::from(body_bytes))
            .map_err(|e| GatewayError::Internal(format!("failed to build response: {}", e)))
    }

    /// Probe one backend's health endpoint with a short timeout.
    /// A dead backend yields `Down`, never an error.
    pub async fn check_health(&self, base_url: &str) -> ServiceHealth {
        let health_url = format!("{}/health", base_url);
        match self
            .client
            .get(&health_url)
            .timeout(self.health_probe_timeout)
            .send()
            .await
        {
            Ok(response) if response.status() == StatusCode::OK => ServiceHealth::Up,
            Ok(response) => {
                tracing::warn!(
                    url = %health_url,
                    status = %response.status().as_u16(),
                    "Backend health probe returned non-OK"
                );
                ServiceHealth::Down
            }
            Err(e) => {
                tracing::warn!(url = %health_url, error = %e, "Backend health probe failed");
                ServiceHealth::Down
            }
        }
    }
}
