use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::auth::users::{Role, User};
use crate::auth::TokenManager;
use crate::config::Config;
use crate::gateway::{RouteTable, ServiceClient};
use crate::ratelimit::RateLimiter;
use crate::stats::GatewayStats;
use crate::store::{MemoryUserStore, UserStore};

/// Shared application state, one instance per process.
///
/// Every mutation of the token, user and window tables goes through the
/// owning component's API; handlers never reach into the tables directly.
pub struct GatewayContext {
    pub config: Arc<Config>,
    pub tokens: TokenManager,
    pub limiter: RateLimiter,
    pub routes: RouteTable,
    pub client: ServiceClient,
    pub stats: GatewayStats,
}

impl GatewayContext {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let store: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new());
        seed_users(&store, &config).context("Failed to seed bootstrap users")?;

        let tokens = TokenManager::new(&config.security, config.token_issuer.clone(), store);
        let limiter = RateLimiter::new(&config.rate_limit);
        let routes = RouteTable::new(&config.backends);
        let client = ServiceClient::new(
            config.upstream_timeout_secs,
            config.health_probe_timeout_secs,
        )?;

        Ok(Self {
            config,
            tokens,
            limiter,
            routes,
            client,
            stats: GatewayStats::new(),
        })
    }
}

/// Seed the bootstrap accounts. Only the admin is strictly required; the
/// per-role accounts exist so a fresh deployment is usable before any admin
/// has created real users.
fn seed_users(store: &Arc<dyn UserStore>, config: &Config) -> Result<()> {
    let admin_hash = bcrypt::hash(&config.seed_admin_password, bcrypt::DEFAULT_COST)?;
    store.put(User::new("admin", admin_hash, Role::Admin, None));

    let seeds = [
        ("attestation.authority", Role::AttestationAuthority, "GOV-01"),
        ("university.registrar", Role::University, "UNI-01"),
        ("employer.hr", Role::Employer, "EMP-01"),
    ];
    for (username, role, org) in seeds {
        let hash = bcrypt::hash(&config.seed_admin_password, bcrypt::DEFAULT_COST)?;
        store.put(User::new(username, hash, role, Some(org.to_string())));
    }

    tracing::info!(count = seeds.len() + 1, "Seeded bootstrap users");
    Ok(())
}
