// ============================================================================
// Gateway statistics
// ============================================================================
//
// Lock-free per-outcome counters for the admin statistics endpoint. Counters
// only ever increase; relaxed ordering is enough since nothing is derived
// from cross-counter invariants.
//
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Default)]
pub struct GatewayStats {
    started_at: Option<DateTime<Utc>>,
    total_requests: AtomicU64,
    forwarded: AtomicU64,
    rate_limited: AtomicU64,
    unauthenticated: AtomicU64,
    forbidden: AtomicU64,
    no_route: AtomicU64,
    upstream_failures: AtomicU64,
    internal_errors: AtomicU64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub uptime_secs: i64,
    pub total_requests: u64,
    pub forwarded: u64,
    pub rate_limited: u64,
    pub unauthenticated: u64,
    pub forbidden: u64,
    pub no_route: u64,
    pub upstream_failures: u64,
    pub internal_errors: u64,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unauthenticated(&self) {
        self.unauthenticated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forbidden(&self) {
        self.forbidden.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_no_route(&self) {
        self.no_route.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_internal_error(&self) {
        self.internal_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self
                .started_at
                .map(|t| (Utc::now() - t).num_seconds())
                .unwrap_or(0),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            unauthenticated: self.unauthenticated.load(Ordering::Relaxed),
            forbidden: self.forbidden.load(Ordering::Relaxed),
            no_route: self.no_route.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            internal_errors: self.internal_errors.load(Ordering::Relaxed),
        }
    }
}
