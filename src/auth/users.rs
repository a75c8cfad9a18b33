use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller roles recognized by the authorization matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    AttestationAuthority,
    University,
    Employer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::AttestationAuthority => "ATTESTATION_AUTHORITY",
            Role::University => "UNIVERSITY",
            Role::Employer => "EMPLOYER",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "ATTESTATION_AUTHORITY" => Ok(Role::AttestationAuthority),
            "UNIVERSITY" => Ok(Role::University),
            "EMPLOYER" => Ok(Role::Employer),
            _ => anyhow::bail!("Unknown role: {}", s),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity record. Never physically deleted; disabling an account clears
/// `active` instead.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub organization_code: Option<String>,
    pub active: bool,
    pub locked: bool,
    pub failed_login_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(
        username: impl Into<String>,
        password_hash: impl Into<String>,
        role: Role,
        organization_code: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            password_hash: password_hash.into(),
            role,
            organization_code,
            active: true,
            locked: false,
            failed_login_attempts: 0,
            created_at: Utc::now(),
            last_login_at: None,
        }
    }
}

/// Public view of a user, safe to embed in responses and token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_code: Option<String>,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
            organization_code: user.organization_code.clone(),
        }
    }
}
