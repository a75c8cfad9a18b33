// ============================================================================
// Authorization matrix
// ============================================================================
//
// Plain data plus a pure function: a static role -> path-prefix table,
// optionally narrowed by HTTP method. ADMIN matches everything. "Read-only"
// grants cover GET and HEAD.
//
// ============================================================================

use axum::http::Method;

use crate::auth::users::Role;

/// One grant: a role may call paths under `prefix`, restricted to `methods`
/// when given (None means every method).
struct Grant {
    role: Role,
    prefix: &'static str,
    methods: Option<&'static [&'static str]>,
}

const READ_ONLY: &[&str] = &["GET", "HEAD"];

/// The static access matrix. Admin is handled before this table is consulted.
const GRANTS: &[Grant] = &[
    // Attestation authorities govern attestations and may read degree records
    Grant {
        role: Role::AttestationAuthority,
        prefix: "/api/v1/attestations",
        methods: None,
    },
    Grant {
        role: Role::AttestationAuthority,
        prefix: "/api/v1/governance",
        methods: None,
    },
    Grant {
        role: Role::AttestationAuthority,
        prefix: "/api/v1/degrees",
        methods: Some(READ_ONLY),
    },
    // Universities own degree and institution records, may read attestations
    Grant {
        role: Role::University,
        prefix: "/api/v1/degrees",
        methods: None,
    },
    Grant {
        role: Role::University,
        prefix: "/api/v1/universities",
        methods: None,
    },
    Grant {
        role: Role::University,
        prefix: "/api/v1/attestations",
        methods: Some(READ_ONLY),
    },
    // Employers verify credentials and manage their own records; degree
    // records are readable but never writable from this side
    Grant {
        role: Role::Employer,
        prefix: "/api/v1/verifications",
        methods: None,
    },
    Grant {
        role: Role::Employer,
        prefix: "/api/v1/employers",
        methods: None,
    },
    Grant {
        role: Role::Employer,
        prefix: "/api/v1/degrees",
        methods: Some(READ_ONLY),
    },
];

/// Decide whether `role` may issue `method` against `path`
pub fn is_allowed(role: Role, method: &Method, path: &str) -> bool {
    if role == Role::Admin {
        return true;
    }

    GRANTS.iter().any(|grant| {
        grant.role == role
            && path.starts_with(grant.prefix)
            && grant
                .methods
                .map(|methods| methods.contains(&method.as_str()))
                .unwrap_or(true)
    })
}
