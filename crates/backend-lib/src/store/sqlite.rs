//! SQLite-backed [`AuthStore`].
//!
//! Tables:
//! - `users`: account data, unique email and username
//! - `sessions`: sid_hash, user_id, expiry, client metadata, revoked flag
//! - `resets`: token_hash, user_id, expiry, client metadata

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lms_common::{Role, UserId};
use parking_lot::Mutex;
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use std::path::Path;

use super::{AuthStore, NewUser, ResetRecord, SessionRecord, StoreError, StoreResult, User};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS "users" (
        "id" INTEGER PRIMARY KEY,
        "name" TEXT NOT NULL,
        "username" TEXT NOT NULL UNIQUE COLLATE NOCASE,
        "email" TEXT NOT NULL UNIQUE COLLATE NOCASE,
        "role" TEXT NOT NULL DEFAULT 'user' CHECK ("role" IN ('admin', 'editor', 'user')),
        "password_hash" TEXT NOT NULL,
        "created" INTEGER NOT NULL,
        "updated" INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS "sessions" (
        "sid_hash" BLOB PRIMARY KEY,
        "user_id" INTEGER NOT NULL,
        "created" INTEGER NOT NULL,
        "expires" INTEGER NOT NULL,
        "ip" TEXT NOT NULL,
        "ua" TEXT NOT NULL,
        "revoked" INTEGER NOT NULL DEFAULT 0 CHECK ("revoked" IN (0, 1))
    );
    CREATE INDEX IF NOT EXISTS "idx_sessions_user" ON "sessions" ("user_id");

    CREATE TABLE IF NOT EXISTS "resets" (
        "token_hash" BLOB PRIMARY KEY,
        "user_id" INTEGER NOT NULL,
        "expires" INTEGER NOT NULL,
        "ip" TEXT NOT NULL,
        "ua" TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS "idx_resets_user" ON "resets" ("user_id");
"#;

const USER_COLUMNS: &str =
    r#""id", "name", "username", "email", "role", "password_hash", "created", "updated""#;

/// SQLite-backed authentication store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Self::init(conn)
    }

    /// Private in-memory database, used by tests and tooling.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub(crate) fn delete_user(&self, id: UserId) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(r#"DELETE FROM "users" WHERE "id" = ?1"#)?;
        Ok(stmt.execute(params![id])?)
    }

    fn user_where(&self, column: &str, value: &dyn rusqlite::ToSql) -> StoreResult<Option<User>> {
        let sql = format!(r#"SELECT {USER_COLUMNS} FROM "users" WHERE "{column}" = ?1"#);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&sql)?;
        Ok(stmt.query_row(params![value], user_from_row).optional()?)
    }
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            Box::new(StoreError::Corrupt(format!("timestamp out of range: {ms}"))),
        )
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(4)?;
    let role = role
        .parse::<Role>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        username: row.get(2)?,
        email: row.get(3)?,
        role,
        password_hash: row.get(5)?,
        created_at: timestamp(row, 6)?,
        updated_at: timestamp(row, 7)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    let revoked: i64 = row.get(6)?;
    Ok(SessionRecord {
        sid_hash: row.get(0)?,
        user_id: row.get(1)?,
        created_at: timestamp(row, 2)?,
        expires_at: timestamp(row, 3)?,
        ip: row.get(4)?,
        user_agent: row.get(5)?,
        revoked: revoked != 0,
    })
}

fn reset_from_row(row: &Row<'_>) -> rusqlite::Result<ResetRecord> {
    Ok(ResetRecord {
        token_hash: row.get(0)?,
        user_id: row.get(1)?,
        expires_at: timestamp(row, 2)?,
        ip: row.get(3)?,
        user_agent: row.get(4)?,
    })
}

#[async_trait]
impl AuthStore for SqliteStore {
    async fn insert_user(&self, user: &NewUser) -> StoreResult<Option<UserId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            r#"INSERT OR IGNORE INTO "users"
               ("name", "username", "email", "role", "password_hash", "created", "updated")
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)"#,
        )?;
        let changes = stmt.execute(params![
            user.name,
            user.username,
            user.email,
            user.role.as_str(),
            user.password_hash,
            millis(user.created_at),
        ])?;
        if changes == 0 {
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid()))
    }

    async fn user_by_id(&self, id: UserId) -> StoreResult<Option<User>> {
        self.user_where("id", &id)
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.user_where("email", &email)
    }

    async fn user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.user_where("username", &username)
    }

    async fn update_password(
        &self,
        id: UserId,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            r#"UPDATE "users" SET "password_hash" = ?1, "updated" = ?2 WHERE "id" = ?3"#,
        )?;
        Ok(stmt.execute(params![password_hash, millis(now), id])?)
    }

    async fn update_role(&self, id: UserId, role: Role, now: DateTime<Utc>) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(r#"UPDATE "users" SET "role" = ?1, "updated" = ?2 WHERE "id" = ?3"#)?;
        Ok(stmt.execute(params![role.as_str(), millis(now), id])?)
    }

    async fn insert_session(&self, session: &SessionRecord) -> StoreResult<()> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            r#"INSERT INTO "sessions"
               ("sid_hash", "user_id", "created", "expires", "ip", "ua", "revoked")
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
        )?;
        stmt.execute(params![
            session.sid_hash,
            session.user_id,
            millis(session.created_at),
            millis(session.expires_at),
            session.ip,
            session.user_agent,
            session.revoked as i64,
        ])?;
        Ok(())
    }

    async fn session_by_hash(&self, sid_hash: &[u8]) -> StoreResult<Option<SessionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            r#"SELECT "sid_hash", "user_id", "created", "expires", "ip", "ua", "revoked"
               FROM "sessions" WHERE "sid_hash" = ?1"#,
        )?;
        Ok(stmt.query_row(params![sid_hash], session_from_row).optional()?)
    }

    async fn revoke_session(&self, sid_hash: &[u8]) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached(r#"UPDATE "sessions" SET "revoked" = 1 WHERE "sid_hash" = ?1"#)?;
        Ok(stmt.execute(params![sid_hash])?)
    }

    async fn revoke_user_sessions(&self, user_id: UserId) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            r#"UPDATE "sessions" SET "revoked" = 1 WHERE "user_id" = ?1 AND "revoked" = 0"#,
        )?;
        Ok(stmt.execute(params![user_id])?)
    }

    async fn extend_session(&self, sid_hash: &[u8], expires_at: DateTime<Utc>) -> StoreResult<usize> {
        let conn = self.conn.lock();
        // Expiry only ever moves forward, so concurrent refreshes cannot shorten a session.
        let mut stmt = conn.prepare_cached(
            r#"UPDATE "sessions" SET "expires" = MAX("expires", ?1) WHERE "sid_hash" = ?2"#,
        )?;
        Ok(stmt.execute(params![millis(expires_at), sid_hash])?)
    }

    async fn insert_reset(&self, reset: &ResetRecord) -> StoreResult<()> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            r#"INSERT INTO "resets" ("token_hash", "user_id", "expires", "ip", "ua")
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
        )?;
        stmt.execute(params![
            reset.token_hash,
            reset.user_id,
            millis(reset.expires_at),
            reset.ip,
            reset.user_agent,
        ])?;
        Ok(())
    }

    async fn take_reset(&self, token_hash: &[u8]) -> StoreResult<Option<ResetRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            r#"DELETE FROM "resets" WHERE "token_hash" = ?1
               RETURNING "token_hash", "user_id", "expires", "ip", "ua""#,
        )?;
        Ok(stmt.query_row(params![token_hash], reset_from_row).optional()?)
    }

    async fn delete_resets(&self, user_id: UserId) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(r#"DELETE FROM "resets" WHERE "user_id" = ?1"#)?;
        Ok(stmt.execute(params![user_id])?)
    }

    async fn prune_resets(&self, user_id: UserId, now: DateTime<Utc>) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            r#"DELETE FROM "resets" WHERE "user_id" = ?1 AND "expires" <= ?2"#,
        )?;
        Ok(stmt.execute(params![user_id, millis(now)])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn new_user(email: &str, username: &str) -> NewUser {
        NewUser {
            name: "Ada".to_string(),
            username: username.to_string(),
            email: email.to_string(),
            role: Role::User,
            password_hash: "scrypt$v=1$norm=NFC$N=1024,r=8,p=1$00$00".to_string(),
            created_at: at(1_700_000_000),
        }
    }

    fn session(hash: &[u8], user_id: UserId) -> SessionRecord {
        SessionRecord {
            sid_hash: hash.to_vec(),
            user_id,
            created_at: at(1_700_000_000),
            expires_at: at(1_700_000_000) + Duration::days(15),
            ip: "127.0.0.1".to_string(),
            user_agent: "test".to_string(),
            revoked: false,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find_user() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store
            .insert_user(&new_user("ada@example.com", "ada"))
            .await
            .unwrap()
            .expect("inserted");

        let by_email = store.user_by_email("ada@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, id);
        assert_eq!(by_email.role, Role::User);
        assert_eq!(by_email.created_at, at(1_700_000_000));

        let by_name = store.user_by_username("ada").await.unwrap().unwrap();
        assert_eq!(by_name.email, "ada@example.com");

        assert!(store.user_by_id(id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_user_is_ignored() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store
            .insert_user(&new_user("ada@example.com", "ada"))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .insert_user(&new_user("ADA@example.com", "other"))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .insert_user(&new_user("other@example.com", "Ada"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_password_and_role() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store
            .insert_user(&new_user("ada@example.com", "ada"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(store.update_password(id, "new", at(1_800_000_000)).await.unwrap(), 1);
        assert_eq!(store.update_role(id, Role::Editor, at(1_800_000_000)).await.unwrap(), 1);
        assert_eq!(store.update_password(id + 9, "new", at(0)).await.unwrap(), 0);

        let user = store.user_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.password_hash, "new");
        assert_eq!(user.role, Role::Editor);
        assert_eq!(user.updated_at, at(1_800_000_000));
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_session(&session(b"a", 1)).await.unwrap();
        store.insert_session(&session(b"b", 1)).await.unwrap();
        store.insert_session(&session(b"c", 2)).await.unwrap();

        let found = store.session_by_hash(b"a").await.unwrap().unwrap();
        assert_eq!(found, session(b"a", 1));

        let later = at(1_700_000_000) + Duration::days(20);
        assert_eq!(store.extend_session(b"a", later).await.unwrap(), 1);
        assert_eq!(store.session_by_hash(b"a").await.unwrap().unwrap().expires_at, later);

        // never moves backwards
        store.extend_session(b"a", at(1_700_000_000)).await.unwrap();
        assert_eq!(store.session_by_hash(b"a").await.unwrap().unwrap().expires_at, later);

        assert_eq!(store.revoke_session(b"a").await.unwrap(), 1);
        assert!(store.session_by_hash(b"a").await.unwrap().unwrap().revoked);

        assert_eq!(store.revoke_user_sessions(1).await.unwrap(), 1);
        assert!(store.session_by_hash(b"b").await.unwrap().unwrap().revoked);
        assert!(!store.session_by_hash(b"c").await.unwrap().unwrap().revoked);
    }

    #[tokio::test]
    async fn test_reset_tokens() {
        let store = SqliteStore::open_in_memory().unwrap();
        let reset = ResetRecord {
            token_hash: b"t1".to_vec(),
            user_id: 4,
            expires_at: at(1_700_000_900),
            ip: "10.0.0.1".to_string(),
            user_agent: "curl".to_string(),
        };
        store.insert_reset(&reset).await.unwrap();
        store
            .insert_reset(&ResetRecord {
                token_hash: b"t2".to_vec(),
                ..reset.clone()
            })
            .await
            .unwrap();

        assert_eq!(store.take_reset(b"t1").await.unwrap(), Some(reset));
        assert!(store.take_reset(b"t1").await.unwrap().is_none());
        assert_eq!(store.delete_resets(4).await.unwrap(), 1);
        assert!(store.take_reset(b"t2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prune_resets_keeps_live_tokens() {
        let store = SqliteStore::open_in_memory().unwrap();
        let reset = |hash: &[u8], user_id, expires| ResetRecord {
            token_hash: hash.to_vec(),
            user_id,
            expires_at: at(expires),
            ip: "10.0.0.1".to_string(),
            user_agent: "curl".to_string(),
        };
        store.insert_reset(&reset(b"old", 4, 1_700_000_000)).await.unwrap();
        store.insert_reset(&reset(b"live", 4, 1_700_001_800)).await.unwrap();
        store.insert_reset(&reset(b"other", 5, 1_600_000_000)).await.unwrap();

        assert_eq!(store.prune_resets(4, at(1_700_000_000)).await.unwrap(), 1);
        assert!(store.take_reset(b"old").await.unwrap().is_none());
        assert!(store.take_reset(b"live").await.unwrap().is_some());
        assert!(store.take_reset(b"other").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lms.sqlite");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_user(&new_user("ada@example.com", "ada")).await.unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.user_by_email("ada@example.com").await.unwrap().is_some());
    }
}
