// ============================
// crates/backend-lib/src/auth/session.rs
// ============================
//! Session and reset-token lifecycle.
//!
//! Only SHA-256 digests of bearer secrets reach the store. Sessions are never
//! deleted, only flagged revoked.
use chrono::{DateTime, Duration, Utc};
use lms_common::{Identity, UserId};
use metrics::counter;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::token::{generate_secure_token, hash_secret};
use crate::clock::Clock;
use crate::error::AppError;
use crate::metrics as keys;
use crate::store::{AuthStore, ResetRecord, SessionRecord};

/// Name of the session cookie. The `__Secure-` prefix makes browsers insist on `Secure`.
pub const SESSION_COOKIE: &str = "__Secure-sid";

/// Session TTL (time to live)
pub const SESSION_TTL_SECS: i64 = 60 * 60 * 24 * 15; // 15 days

/// Sessions with less than this left are extended on use
pub const REFRESH_WINDOW_SECS: i64 = 60 * 60 * 24 * 5; // 5 days

/// Reset token TTL
pub const RESET_TOKEN_TTL_SECS: i64 = 60 * 30; // 30 minutes

/// `Set-Cookie` directive for the session cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    value: String,
    max_age: i64,
}

impl SessionCookie {
    pub fn new(value: impl Into<String>, max_age: i64) -> Self {
        Self {
            value: value.into(),
            max_age: max_age.max(0),
        }
    }

    /// Directive that makes the client drop its cookie
    pub fn clear() -> Self {
        Self::new("", 0)
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn max_age(&self) -> i64 {
        self.max_age
    }

    pub fn is_clearing(&self) -> bool {
        self.max_age == 0
    }
}

impl fmt::Display for SessionCookie {
    // No Domain attribute: the cookie stays host-only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SESSION_COOKIE}={}; Path=/; Max-Age={}; HttpOnly; Secure; SameSite=Lax",
            self.value, self.max_age
        )
    }
}

/// Outcome of [`SessionService::validate`]
#[derive(Debug, Clone)]
pub struct Validation {
    /// Directive to send back whatever the outcome
    pub cookie: SessionCookie,
    /// Present only when the session is valid
    pub identity: Option<Identity>,
}

impl Validation {
    fn invalid() -> Self {
        Self {
            cookie: SessionCookie::clear(),
            identity: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.identity.is_some()
    }
}

/// Creates, validates, refreshes and revokes sessions; issues reset tokens.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn AuthStore>,
    clock: Arc<dyn Clock>,
}

fn seconds_until(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds()
}

impl SessionService {
    pub fn new(store: Arc<dyn AuthStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Open a session for `user_id` and return the cookie carrying its secret
    pub async fn create_session(
        &self,
        user_id: UserId,
        ip: &str,
        user_agent: &str,
    ) -> Result<SessionCookie, AppError> {
        let sid = generate_secure_token();
        let now = self.clock.now();
        let record = SessionRecord {
            sid_hash: hash_secret(&sid),
            user_id,
            created_at: now,
            expires_at: now + Duration::seconds(SESSION_TTL_SECS),
            ip: ip.to_string(),
            user_agent: user_agent.to_string(),
            revoked: false,
        };
        self.store.insert_session(&record).await?;

        counter!(keys::SESSION_CREATED).increment(1);
        debug!(user_id, "session created");

        Ok(SessionCookie::new(sid, SESSION_TTL_SECS))
    }

    /// Look up the session behind `sid`, refreshing it when close to expiry
    pub async fn validate(&self, sid: &str) -> Result<Validation, AppError> {
        let now = self.clock.now();
        let sid_hash = hash_secret(sid);

        let Some(session) = self.store.session_by_hash(&sid_hash).await? else {
            return Ok(Validation::invalid());
        };
        if session.revoked {
            return Ok(Validation::invalid());
        }

        if now >= session.expires_at {
            self.store.revoke_session(&sid_hash).await?;
            counter!(keys::SESSION_REVOKED).increment(1);
            debug!(user_id = session.user_id, "expired session revoked");
            return Ok(Validation::invalid());
        }

        let Some(user) = self.store.user_by_id(session.user_id).await? else {
            self.store.revoke_session(&sid_hash).await?;
            counter!(keys::SESSION_REVOKED).increment(1);
            warn!(user_id = session.user_id, "session of missing user revoked");
            return Ok(Validation::invalid());
        };

        let mut expires_at = session.expires_at;
        if seconds_until(now, expires_at) <= REFRESH_WINDOW_SECS {
            expires_at = now + Duration::seconds(SESSION_TTL_SECS);
            self.store.extend_session(&sid_hash, expires_at).await?;
            counter!(keys::SESSION_REFRESHED).increment(1);
            debug!(user_id = user.id, "session refreshed");
        }

        Ok(Validation {
            cookie: SessionCookie::new(sid, seconds_until(now, expires_at)),
            identity: Some(Identity {
                user_id: user.id,
                role: user.role,
                expires_at,
            }),
        })
    }

    /// Revoke the session behind `sid` if any. Never fails.
    pub async fn invalidate(&self, sid: Option<&str>) -> SessionCookie {
        if let Some(sid) = sid.filter(|s| !s.is_empty()) {
            match self.store.revoke_session(&hash_secret(sid)).await {
                Ok(changed) => {
                    if changed > 0 {
                        counter!(keys::SESSION_REVOKED).increment(1);
                    }
                },
                Err(err) => warn!(error = %err, "session not revoked in store"),
            }
        }
        SessionCookie::clear()
    }

    /// Revoke every session of a user, e.g. after a credential change
    pub async fn revoke_all(&self, user_id: UserId) -> Result<usize, AppError> {
        let revoked = self.store.revoke_user_sessions(user_id).await?;
        counter!(keys::SESSION_REVOKED).increment(revoked as u64);
        debug!(user_id, revoked, "all sessions revoked");
        Ok(revoked)
    }

    /// Issue a single-use reset token. Only its digest is stored.
    pub async fn reset_token(
        &self,
        user_id: UserId,
        ip: &str,
        user_agent: &str,
    ) -> Result<String, AppError> {
        let now = self.clock.now();
        let pruned = self.store.prune_resets(user_id, now).await?;
        if pruned > 0 {
            debug!(user_id, pruned, "expired reset tokens dropped");
        }

        let token = generate_secure_token();
        let record = ResetRecord {
            token_hash: hash_secret(&token),
            user_id,
            expires_at: now + Duration::seconds(RESET_TOKEN_TTL_SECS),
            ip: ip.to_string(),
            user_agent: user_agent.to_string(),
        };
        self.store.insert_reset(&record).await?;
        Ok(token)
    }

    /// Redeem a reset token. The token is removed as it is read, so it is
    /// honored once; an expired token is removed and reported invalid.
    pub async fn validate_token(&self, token: &str) -> Result<Option<ResetRecord>, AppError> {
        let Some(reset) = self.store.take_reset(&hash_secret(token)).await? else {
            return Ok(None);
        };
        if self.clock.now() >= reset.expires_at {
            debug!(user_id = reset.user_id, "expired reset token presented");
            return Ok(None);
        }
        Ok(Some(reset))
    }

    /// Drop every outstanding reset token of a user
    pub async fn consume_tokens(&self, user_id: UserId) -> Result<usize, AppError> {
        Ok(self.store.delete_resets(user_id).await?)
    }
}
