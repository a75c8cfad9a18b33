// ============================================================================
// Aggregated health
// ============================================================================

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::context::GatewayContext;
use crate::gateway::ServiceHealth;

/// Probe every backend concurrently and report per-service status plus an
/// overall verdict. Always answers 200; a degraded deployment is a body
/// detail, not a transport failure.
pub async fn aggregate_health(State(ctx): State<Arc<GatewayContext>>) -> Json<Value> {
    let backends = ctx.routes.backends();
    let probes = backends
        .iter()
        .map(|(_, base_url)| ctx.client.check_health(base_url));
    let results = futures::future::join_all(probes).await;

    let mut services = serde_json::Map::new();
    let mut all_up = true;
    for ((service, _), health) in backends.iter().zip(results) {
        if health == ServiceHealth::Down {
            all_up = false;
        }
        let status = match health {
            ServiceHealth::Up => "UP",
            ServiceHealth::Down => "DOWN",
        };
        services.insert(service.as_str().to_string(), json!(status));
    }

    Json(json!({
        "status": if all_up { "UP" } else { "DEGRADED" },
        "gateway": "credchain-gateway",
        "timestamp": Utc::now().to_rfc3339(),
        "services": services,
    }))
}
