// ============================================================================
// Token Manager
// ============================================================================
//
// Owns the bearer-token lifecycle: issuance at login, validation on every
// protected request, refresh rotation, logout teardown and administrative
// revocation. Tokens are HS256-signed JWTs, but the signature alone is not
// sufficient: the manager keeps a table of live tokens so revocation takes
// effect immediately. A token unknown to the table is invalid no matter what
// its signature says.
//
// The token and user tables are the only state; no network I/O happens here.
//
// ============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::users::{Role, User, UserInfo};
use crate::config::SecurityConfig;
use crate::error::GatewayError;
use crate::store::UserStore;

/// Authentication failures are ordinary values, never panics. Validation
/// failures do not even reach this type: `validate` returns `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    InvalidCredentials,
    AccountLocked,
    TokenExpiredOrUnknown,
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => GatewayError::InvalidCredentials,
            AuthError::AccountLocked => GatewayError::AccountLocked,
            AuthError::TokenExpiredOrUnknown => GatewayError::TokenExpiredOrUnknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    pub kind: TokenKind,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// Record associated with a live token string
#[derive(Debug, Clone)]
struct TokenRecord {
    user_id: Uuid,
    role: Role,
    organization_code: Option<String>,
    kind: TokenKind,
    expires_at: DateTime<Utc>,
}

/// token string -> record, plus a per-user index for revocation
#[derive(Default)]
struct TokenTables {
    by_token: HashMap<String, TokenRecord>,
    by_user: HashMap<Uuid, HashSet<String>>,
}

impl TokenTables {
    fn insert(&mut self, token: String, record: TokenRecord) {
        self.by_user
            .entry(record.user_id)
            .or_default()
            .insert(token.clone());
        self.by_token.insert(token, record);
    }

    fn remove(&mut self, token: &str) -> Option<TokenRecord> {
        let record = self.by_token.remove(token)?;
        if let Some(set) = self.by_user.get_mut(&record.user_id) {
            set.remove(token);
            if set.is_empty() {
                self.by_user.remove(&record.user_id);
            }
        }
        Some(record)
    }

    fn remove_all_for_user(&mut self, user_id: Uuid) -> usize {
        match self.by_user.remove(&user_id) {
            Some(tokens) => {
                for token in &tokens {
                    self.by_token.remove(token);
                }
                tokens.len()
            }
            None => 0,
        }
    }
}

/// Successful login/refresh outcome
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

pub struct TokenManager {
    store: Arc<dyn UserStore>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    max_failed_attempts: u32,
    tables: Mutex<TokenTables>,
}

impl TokenManager {
    pub fn new(security: &SecurityConfig, issuer: String, store: Arc<dyn UserStore>) -> Self {
        Self {
            store,
            encoding_key: EncodingKey::from_secret(security.signing_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(security.signing_secret.as_bytes()),
            issuer,
            access_ttl: Duration::seconds(security.access_token_ttl_secs),
            refresh_ttl: Duration::seconds(security.refresh_token_ttl_secs),
            max_failed_attempts: security.max_failed_login_attempts,
            tables: Mutex::new(TokenTables::default()),
        }
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    /// Verify credentials and mint a fresh access/refresh pair.
    ///
    /// A hash mismatch increments the failed-attempt counter; reaching the
    /// threshold locks the account and revokes every live token for it.
    /// A successful login resets the counter.
    pub fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(TokenPair, UserInfo), AuthError> {
        let user = self
            .store
            .get_by_username(username)
            .ok_or(AuthError::InvalidCredentials)?;

        if user.locked {
            return Err(AuthError::AccountLocked);
        }
        if !user.active {
            return Err(AuthError::InvalidCredentials);
        }

        let password_ok = bcrypt::verify(password, &user.password_hash).unwrap_or(false);
        if !password_ok {
            let threshold = self.max_failed_attempts;
            let mut now_locked = false;
            self.store.update(user.id, &mut |u| {
                u.failed_login_attempts += 1;
                if u.failed_login_attempts >= threshold {
                    u.locked = true;
                    now_locked = true;
                }
            });
            if now_locked {
                self.revoke_all(user.id);
                tracing::warn!(
                    username = %username,
                    attempts = threshold,
                    "Account locked after repeated failed logins"
                );
            }
            return Err(AuthError::InvalidCredentials);
        }

        self.store.update(user.id, &mut |u| {
            u.failed_login_attempts = 0;
            u.last_login_at = Some(Utc::now());
        });

        let pair = self.mint_pair(&user).map_err(|e| {
            tracing::error!(error = %e, "Failed to mint token pair");
            AuthError::InvalidCredentials
        })?;

        Ok((pair, UserInfo::from(&user)))
    }

    /// Exchange a refresh token for a new pair. Strictly single-use: the
    /// presented token is removed before the new pair is minted, so a second
    /// exchange of the same string always fails, including under concurrency.
    pub fn refresh(&self, refresh_token: &str) -> Result<(TokenPair, UserInfo), AuthError> {
        let record = {
            let mut tables = self.tables.lock().expect("token table lock poisoned");
            let record = tables
                .by_token
                .get(refresh_token)
                .cloned()
                .ok_or(AuthError::TokenExpiredOrUnknown)?;
            if record.kind != TokenKind::Refresh {
                return Err(AuthError::TokenExpiredOrUnknown);
            }
            // Single take under the lock; a concurrent exchange loses here
            tables
                .remove(refresh_token)
                .ok_or(AuthError::TokenExpiredOrUnknown)?
        };

        if record.expires_at <= Utc::now() {
            return Err(AuthError::TokenExpiredOrUnknown);
        }

        let user = self
            .store
            .get(record.user_id)
            .ok_or(AuthError::TokenExpiredOrUnknown)?;
        if !user.active || user.locked {
            return Err(AuthError::TokenExpiredOrUnknown);
        }

        let pair = self
            .mint_pair(&user)
            .map_err(|_| AuthError::TokenExpiredOrUnknown)?;
        Ok((pair, UserInfo::from(&user)))
    }

    /// Validate an access token. Fails closed: malformed, unknown, expired or
    /// revoked tokens and disabled owners all come back as `None`. Never
    /// returns an error for garbage input.
    pub fn validate(&self, access_token: &str) -> Option<UserInfo> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.clone()]);
        if decode::<Claims>(access_token, &self.decoding_key, &validation).is_err() {
            return None;
        }

        let record = {
            let mut tables = self.tables.lock().expect("token table lock poisoned");
            let record = tables.by_token.get(access_token).cloned()?;
            if record.expires_at <= Utc::now() {
                // Lazy deletion at validation time
                tables.remove(access_token);
                return None;
            }
            record
        };

        if record.kind != TokenKind::Access {
            return None;
        }

        let user = self.store.get(record.user_id)?;
        if !user.active || user.locked {
            return None;
        }

        Some(UserInfo {
            id: user.id,
            username: user.username.clone(),
            role: record.role,
            organization_code: record.organization_code.clone(),
        })
    }

    /// Full session teardown: removes the presented access token and every
    /// other live token (including refresh tokens) owned by the same user.
    pub fn logout(&self, access_token: &str) -> bool {
        let mut tables = self.tables.lock().expect("token table lock poisoned");
        match tables.by_token.get(access_token) {
            Some(record) => {
                let user_id = record.user_id;
                tables.remove_all_for_user(user_id);
                true
            }
            None => false,
        }
    }

    /// Administrative lock. Revokes all live tokens immediately; there is no
    /// grace period for in-flight sessions.
    pub fn lock_user(&self, user_id: Uuid) -> bool {
        let found = self.store.update(user_id, &mut |u| u.locked = true);
        if found {
            let revoked = self.revoke_all(user_id);
            tracing::info!(user_id = %user_id, revoked, "User locked by admin");
        }
        found
    }

    pub fn unlock_user(&self, user_id: Uuid) -> bool {
        let found = self.store.update(user_id, &mut |u| {
            u.locked = false;
            u.failed_login_attempts = 0;
        });
        if found {
            tracing::info!(user_id = %user_id, "User unlocked by admin");
        }
        found
    }

    /// Drop expired records. Expiry is already enforced lazily during
    /// validation; this sweep just bounds table growth for tokens that are
    /// never presented again.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut tables = self.tables.lock().expect("token table lock poisoned");
        let expired: Vec<String> = tables
            .by_token
            .iter()
            .filter(|(_, r)| r.expires_at <= now)
            .map(|(t, _)| t.clone())
            .collect();
        for token in &expired {
            tables.remove(token);
        }
        expired.len()
    }

    /// (live access tokens, live refresh tokens)
    pub fn live_token_counts(&self) -> (usize, usize) {
        let tables = self.tables.lock().expect("token table lock poisoned");
        let access = tables
            .by_token
            .values()
            .filter(|r| r.kind == TokenKind::Access)
            .count();
        (access, tables.by_token.len() - access)
    }

    fn revoke_all(&self, user_id: Uuid) -> usize {
        self.tables
            .lock()
            .expect("token table lock poisoned")
            .remove_all_for_user(user_id)
    }

    fn mint_pair(&self, user: &User) -> anyhow::Result<TokenPair> {
        let access_token = self.mint(user, TokenKind::Access, self.access_ttl)?;
        let refresh_token = self.mint(user, TokenKind::Refresh, self.refresh_ttl)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    fn mint(&self, user: &User, kind: TokenKind, ttl: Duration) -> anyhow::Result<String> {
        let now = Utc::now();
        let expires_at = now + ttl;
        let claims = Claims {
            sub: user.id.to_string(),
            role: user.role,
            org: user.organization_code.clone(),
            kind,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        let record = TokenRecord {
            user_id: user.id,
            role: user.role,
            organization_code: user.organization_code.clone(),
            kind,
            expires_at,
        };
        self.tables
            .lock()
            .expect("token table lock poisoned")
            .insert(token.clone(), record);

        Ok(token)
    }
}
