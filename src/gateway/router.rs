// ============================================================================
// Route table
// ============================================================================
//
// Static path-prefix -> backend mapping. When several prefixes match, the
// longest one wins, so a more specific mapping can always be carved out of a
// broader one regardless of declaration order.
//
// ============================================================================

use serde::Serialize;

use crate::config::BackendConfig;

/// The backend services the gateway fronts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendService {
    Attestation,
    University,
    Employer,
}

impl BackendService {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendService::Attestation => "attestation-service",
            BackendService::University => "university-service",
            BackendService::Employer => "employer-service",
        }
    }
}

impl std::fmt::Display for BackendService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Route {
    pub path_prefix: &'static str,
    pub service: BackendService,
    pub base_url: String,
}

pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(backends: &BackendConfig) -> Self {
        let routes = vec![
            Route {
                path_prefix: "/api/v1/attestations",
                service: BackendService::Attestation,
                base_url: backends.attestation_url.clone(),
            },
            Route {
                path_prefix: "/api/v1/governance",
                service: BackendService::Attestation,
                base_url: backends.attestation_url.clone(),
            },
            Route {
                path_prefix: "/api/v1/degrees",
                service: BackendService::University,
                base_url: backends.university_url.clone(),
            },
            Route {
                path_prefix: "/api/v1/universities",
                service: BackendService::University,
                base_url: backends.university_url.clone(),
            },
            Route {
                path_prefix: "/api/v1/verifications",
                service: BackendService::Employer,
                base_url: backends.employer_url.clone(),
            },
            Route {
                path_prefix: "/api/v1/employers",
                service: BackendService::Employer,
                base_url: backends.employer_url.clone(),
            },
        ];
        Self { routes }
    }

    /// Longest matching prefix wins
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .filter(|route| path.starts_with(route.path_prefix))
            .max_by_key(|route| route.path_prefix.len())
    }

    /// Distinct (service, base_url) pairs, for health aggregation
    pub fn backends(&self) -> Vec<(BackendService, String)> {
        let mut seen = Vec::new();
        for route in &self.routes {
            if !seen.iter().any(|(s, _)| *s == route.service) {
                seen.push((route.service, route.base_url.clone()));
            }
        }
        seen
    }
}
