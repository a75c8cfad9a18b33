// ============================================================================
// Rate Limiter
// ============================================================================
//
// Fixed-window counters per (client, rule). Fixed windows are cheap and keep
// memory bounded, at the cost of admitting up to a 2x burst straddling a
// window boundary; that tradeoff is accepted here.
//
// Rule resolution order: endpoint patterns (most specific first), then the
// caller's role, then the default rule.
//
// The whole check is one read-modify-write under a single lock. Two
// concurrent requests from the same client can never both be admitted past
// the limit; that is a correctness requirement, not an optimization.
//
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::auth::users::Role;
use crate::config::RateLimitConfig;

/// A single quota rule. `pattern` is a path literal, optionally ending in
/// `*` for prefix matching.
#[derive(Debug, Clone)]
pub struct RateLimitRule {
    pub key: String,
    pub pattern: String,
    pub max_requests: u32,
    pub window: Duration,
    pub description: &'static str,
}

impl RateLimitRule {
    fn matches(&self, path: &str) -> bool {
        match self.pattern.strip_suffix('*') {
            Some(prefix) => path.starts_with(prefix),
            None => path == self.pattern,
        }
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix timestamp (seconds) when the current window resets
    pub reset_at: i64,
    pub rule_key: String,
}

/// Per-(client, rule) fixed window
#[derive(Debug, Clone)]
struct ClientWindow {
    request_count: u32,
    window_start: DateTime<Utc>,
    last_request_at: DateTime<Utc>,
}

#[derive(Default)]
struct LimiterState {
    windows: HashMap<(String, String), ClientWindow>,
    blocked_until: HashMap<String, DateTime<Utc>>,
}

pub struct RateLimiter {
    enabled: bool,
    endpoint_rules: Vec<RateLimitRule>,
    role_rules: HashMap<Role, RateLimitRule>,
    default_rule: RateLimitRule,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let window = Duration::seconds(config.window_secs);
        let base = config.default_requests_per_minute;

        // Endpoint-specific rules, most specific first. Login gets a tight
        // budget as a brute-force guard; the public verification endpoint a
        // generous one since it serves anonymous traffic.
        let endpoint_rules = vec![
            RateLimitRule {
                key: "endpoint:auth-login".to_string(),
                pattern: "/api/v1/auth/login".to_string(),
                max_requests: 10,
                window,
                description: "login attempts",
            },
            RateLimitRule {
                key: "endpoint:auth-refresh".to_string(),
                pattern: "/api/v1/auth/refresh".to_string(),
                max_requests: 30,
                window,
                description: "token refresh",
            },
            RateLimitRule {
                key: "endpoint:public-verification".to_string(),
                pattern: "/api/v1/verifications/public*".to_string(),
                max_requests: base.saturating_mul(2),
                window,
                description: "public credential verification",
            },
        ];

        // Role-based multipliers over the default budget
        let mut role_rules = HashMap::new();
        role_rules.insert(
            Role::Admin,
            RateLimitRule {
                key: "role:admin".to_string(),
                pattern: String::new(),
                max_requests: base.saturating_mul(5),
                window,
                description: "admin traffic",
            },
        );
        role_rules.insert(
            Role::AttestationAuthority,
            RateLimitRule {
                key: "role:attestation-authority".to_string(),
                pattern: String::new(),
                max_requests: base.saturating_mul(2),
                window,
                description: "attestation authority traffic",
            },
        );

        let default_rule = RateLimitRule {
            key: "default".to_string(),
            pattern: String::new(),
            max_requests: base,
            window,
            description: "default budget",
        };

        Self {
            enabled: config.enabled,
            endpoint_rules,
            role_rules,
            default_rule,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Resolve the applicable rule for a path and (optional) caller role
    fn resolve(&self, path: &str, role: Option<Role>) -> &RateLimitRule {
        if let Some(rule) = self.endpoint_rules.iter().find(|r| r.matches(path)) {
            return rule;
        }
        if let Some(rule) = role.and_then(|r| self.role_rules.get(&r)) {
            return rule;
        }
        &self.default_rule
    }

    /// Admission check: resolve the rule, then atomically bump the client's
    /// window and compare against the budget.
    pub fn check(&self, client_id: &str, path: &str, role: Option<Role>) -> Decision {
        let rule = self.resolve(path, role);
        let now = Utc::now();

        if !self.enabled {
            return Decision {
                allowed: true,
                limit: rule.max_requests,
                remaining: rule.max_requests,
                reset_at: (now + rule.window).timestamp(),
                rule_key: rule.key.clone(),
            };
        }

        let mut state = self.state.lock().expect("rate limiter lock poisoned");

        // Administrative block overrides every rule
        if let Some(until) = state.blocked_until.get(client_id) {
            if *until > now {
                return Decision {
                    allowed: false,
                    limit: rule.max_requests,
                    remaining: 0,
                    reset_at: until.timestamp(),
                    rule_key: "blocked".to_string(),
                };
            }
            state.blocked_until.remove(client_id);
        }

        let window = state
            .windows
            .entry((client_id.to_string(), rule.key.clone()))
            .or_insert(ClientWindow {
                request_count: 0,
                window_start: now,
                last_request_at: now,
            });

        if now - window.window_start >= rule.window {
            // Fixed-window rollover
            window.request_count = 1;
            window.window_start = now;
        } else {
            window.request_count += 1;
        }
        window.last_request_at = now;

        let allowed = window.request_count <= rule.max_requests;
        Decision {
            allowed,
            limit: rule.max_requests,
            remaining: rule.max_requests.saturating_sub(window.request_count),
            reset_at: (window.window_start + rule.window).timestamp(),
            rule_key: rule.key.clone(),
        }
    }

    /// Admin override: forget every window (and block) for a client
    pub fn reset_client(&self, client_id: &str) -> usize {
        let mut state = self.state.lock().expect("rate limiter lock poisoned");
        state.blocked_until.remove(client_id);
        let before = state.windows.len();
        state.windows.retain(|(client, _), _| client != client_id);
        before - state.windows.len()
    }

    /// Force every request from a client over-limit for a duration
    pub fn block_client(&self, client_id: &str, duration_minutes: i64) {
        let until = Utc::now() + Duration::minutes(duration_minutes);
        self.state
            .lock()
            .expect("rate limiter lock poisoned")
            .blocked_until
            .insert(client_id.to_string(), until);
        tracing::warn!(client_id = %client_id, minutes = duration_minutes, "Client blocked");
    }

    /// Drop windows idle longer than twice their rule's duration. Run
    /// periodically; bounds memory under client churn.
    pub fn evict_idle(&self) -> usize {
        let now = Utc::now();
        let rule_windows: HashMap<String, Duration> = self
            .endpoint_rules
            .iter()
            .chain(self.role_rules.values())
            .chain(std::iter::once(&self.default_rule))
            .map(|r| (r.key.clone(), r.window))
            .collect();

        let mut state = self.state.lock().expect("rate limiter lock poisoned");
        let before = state.windows.len();
        state.windows.retain(|(_, rule_key), window| {
            let rule_window = rule_windows
                .get(rule_key)
                .copied()
                .unwrap_or_else(|| Duration::seconds(60));
            now - window.last_request_at < rule_window * 2
        });
        state.blocked_until.retain(|_, until| *until > now);
        before - state.windows.len()
    }

    pub fn active_windows(&self) -> usize {
        self.state
            .lock()
            .expect("rate limiter lock poisoned")
            .windows
            .len()
    }

    pub fn blocked_clients(&self) -> usize {
        self.state
            .lock()
            .expect("rate limiter lock poisoned")
            .blocked_until
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn limiter(default_per_minute: u32) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            enabled: true,
            default_requests_per_minute: default_per_minute,
            window_secs: 60,
        })
    }

    #[test]
    fn test_endpoint_rule_takes_precedence_over_role() {
        let limiter = limiter(60);
        let rule = limiter.resolve("/api/v1/auth/login", Some(Role::Admin));
        assert_eq!(rule.key, "endpoint:auth-login");
    }

    #[test]
    fn test_role_rule_beats_default() {
        let limiter = limiter(60);
        assert_eq!(
            limiter.resolve("/api/v1/degrees", Some(Role::Admin)).key,
            "role:admin"
        );
        assert_eq!(
            limiter.resolve("/api/v1/degrees", Some(Role::Employer)).key,
            "default"
        );
        assert_eq!(limiter.resolve("/api/v1/degrees", None).key, "default");
    }

    #[test]
    fn test_prefix_pattern_matching() {
        let limiter = limiter(60);
        assert_eq!(
            limiter
                .resolve("/api/v1/verifications/public/deg-1", None)
                .key,
            "endpoint:public-verification"
        );
        // Exact patterns do not match sub-paths
        assert_eq!(
            limiter.resolve("/api/v1/auth/login/extra", None).key,
            "default"
        );
    }

    #[test]
    fn test_budget_exhaustion_and_remaining() {
        let limiter = limiter(3);
        for expected_remaining in [2, 1, 0] {
            let d = limiter.check("client-a", "/api/v1/degrees", None);
            assert!(d.allowed);
            assert_eq!(d.remaining, expected_remaining);
            assert_eq!(d.limit, 3);
        }
        let d = limiter.check("client-a", "/api/v1/degrees", None);
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
        assert!(d.reset_at > Utc::now().timestamp() - 1);
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = limiter(1);
        assert!(limiter.check("a", "/api/v1/degrees", None).allowed);
        assert!(!limiter.check("a", "/api/v1/degrees", None).allowed);
        assert!(limiter.check("b", "/api/v1/degrees", None).allowed);
    }

    #[test]
    fn test_window_rollover_readmits() {
        let limiter = limiter(1);
        assert!(limiter.check("a", "/api/v1/degrees", None).allowed);
        assert!(!limiter.check("a", "/api/v1/degrees", None).allowed);

        // Age the window past its duration instead of sleeping
        {
            let mut state = limiter.state.lock().unwrap();
            for window in state.windows.values_mut() {
                window.window_start = Utc::now() - Duration::seconds(61);
            }
        }
        assert!(limiter.check("a", "/api/v1/degrees", None).allowed);
    }

    #[test]
    fn test_reset_client_clears_windows() {
        let limiter = limiter(1);
        assert!(limiter.check("a", "/api/v1/degrees", None).allowed);
        assert!(!limiter.check("a", "/api/v1/degrees", None).allowed);

        assert_eq!(limiter.reset_client("a"), 1);
        assert!(limiter.check("a", "/api/v1/degrees", None).allowed);
    }

    #[test]
    fn test_block_client_forces_over_limit() {
        let limiter = limiter(100);
        limiter.block_client("a", 10);
        let d = limiter.check("a", "/api/v1/degrees", None);
        assert!(!d.allowed);
        assert_eq!(d.rule_key, "blocked");
        // Other clients are unaffected
        assert!(limiter.check("b", "/api/v1/degrees", None).allowed);
        // reset lifts the block
        limiter.reset_client("a");
        assert!(limiter.check("a", "/api/v1/degrees", None).allowed);
    }

    #[test]
    fn test_eviction_drops_idle_windows() {
        let limiter = limiter(10);
        limiter.check("a", "/api/v1/degrees", None);
        limiter.check("b", "/api/v1/degrees", None);
        assert_eq!(limiter.active_windows(), 2);

        {
            let mut state = limiter.state.lock().unwrap();
            if let Some(w) = state
                .windows
                .get_mut(&("a".to_string(), "default".to_string()))
            {
                w.last_request_at = Utc::now() - Duration::seconds(121);
            }
        }
        assert_eq!(limiter.evict_idle(), 1);
        assert_eq!(limiter.active_windows(), 1);
    }

    #[test]
    fn test_disabled_limiter_admits_everything() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: false,
            default_requests_per_minute: 1,
            window_secs: 60,
        });
        for _ in 0..10 {
            assert!(limiter.check("a", "/api/v1/degrees", None).allowed);
        }
    }

    /// Concurrency-safety property: 100 simultaneous requests against a
    /// budget of 10 admit exactly 10, never more.
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_admissions_never_exceed_limit() {
        let limiter = Arc::new(limiter(10));
        let admitted = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..100 {
            let limiter = limiter.clone();
            let admitted = admitted.clone();
            handles.push(tokio::spawn(async move {
                if limiter.check("burst-client", "/api/v1/degrees", None).allowed {
                    admitted.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 10);
    }
}
