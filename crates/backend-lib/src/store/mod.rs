// ============================
// crates/backend-lib/src/store/mod.rs
// ============================
//! Storage abstraction for users, sessions and reset tokens.
//!
//! Every implementation must bind values as query parameters; no value is
//! ever interpolated into SQL text.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lms_common::{Role, UserId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A registered account
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    /// Self-describing encoded hash, see [`crate::auth::PasswordHasher`]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create an account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Stored session. The bearer secret itself is never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// SHA-256 of the bearer secret
    pub sid_hash: Vec<u8>,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ip: String,
    pub user_agent: String,
    pub revoked: bool,
}

/// Stored password reset token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetRecord {
    /// SHA-256 of the emailed token
    pub token_hash: Vec<u8>,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub ip: String,
    pub user_agent: String,
}

/// Narrow query interface over the user/session database
#[async_trait]
pub trait AuthStore: Send + Sync {
    /// Insert a user. Returns `None` when the email or username is taken.
    async fn insert_user(&self, user: &NewUser) -> StoreResult<Option<UserId>>;

    async fn user_by_id(&self, id: UserId) -> StoreResult<Option<User>>;

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    /// Returns the number of rows changed
    async fn update_password(
        &self,
        id: UserId,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<usize>;

    async fn update_role(&self, id: UserId, role: Role, now: DateTime<Utc>) -> StoreResult<usize>;

    async fn insert_session(&self, session: &SessionRecord) -> StoreResult<()>;

    async fn session_by_hash(&self, sid_hash: &[u8]) -> StoreResult<Option<SessionRecord>>;

    async fn revoke_session(&self, sid_hash: &[u8]) -> StoreResult<usize>;

    async fn revoke_user_sessions(&self, user_id: UserId) -> StoreResult<usize>;

    async fn extend_session(&self, sid_hash: &[u8], expires_at: DateTime<Utc>) -> StoreResult<usize>;

    async fn insert_reset(&self, reset: &ResetRecord) -> StoreResult<()>;

    /// Remove a reset token and return it, expired or not. Concurrent callers
    /// presenting the same token see it at most once.
    async fn take_reset(&self, token_hash: &[u8]) -> StoreResult<Option<ResetRecord>>;

    async fn delete_resets(&self, user_id: UserId) -> StoreResult<usize>;

    /// Drop a user's reset tokens that expired at or before `now`
    async fn prune_resets(&self, user_id: UserId, now: DateTime<Utc>) -> StoreResult<usize>;
}
