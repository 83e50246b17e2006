//! Account persistence: repository trait plus Postgres and in-memory backends.
//!
//! The orchestrator and the user-management handlers only ever see
//! `UserRepository`; tests and local development run on the in-memory
//! implementation, production runs on Postgres.
//!
//! Attempt counters and the lock timestamp follow a read-modify-write cycle
//! per request (whole-record UPDATE by id, no row locking). Concurrent
//! failures against one account may overshoot the lockout threshold by a
//! bounded amount; that is an accepted weak-consistency point, not a bug.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::Instrument;
use uuid::Uuid;

use super::utils::is_unique_violation;

#[derive(Clone, Debug)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub active: bool,
    pub superuser: bool,
    pub email_verified: bool,
    pub email_verification_token: Option<String>,
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Fresh account: active, unverified, no failures.
    #[must_use]
    pub fn new(id: Uuid, email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            email,
            password_hash,
            active: true,
            superuser: false,
            email_verified: false,
            email_verification_token: None,
            failed_attempts: 0,
            locked_until: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("User with this email already exists")]
    DuplicateEmail,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Abstract CRUD over accounts, keyed by id or exact-match email.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create an account; uniqueness check and insert are one logical unit.
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Persist the full mutated record.
    async fn update(&self, user: &User) -> Result<(), StoreError>;

    /// Delete by id; returns whether a record existed.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<User>, StoreError>;

    async fn count_superusers(&self, only_active: bool) -> Result<i64, StoreError>;

    /// Atomically consume a verification token: set `email_verified`, clear
    /// the token, return the updated account. `None` when the token is
    /// unknown or already consumed.
    async fn consume_verification_token(&self, token: &str) -> Result<Option<User>, StoreError>;
}

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_user(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        active: row.get("active"),
        superuser: row.get("superuser"),
        email_verified: row.get("email_verified"),
        email_verification_token: row.get("email_verification_token"),
        failed_attempts: row.get("failed_attempts"),
        locked_until: row.get("locked_until"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, active, superuser, email_verified, \
     email_verification_token, failed_attempts, locked_until, created_at, updated_at";

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let query = format!(
            r"
            INSERT INTO users (id, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
        "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT"
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(email)
            .bind(password_hash)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(map_user(&row)),
            Err(err) if is_unique_violation(&err) => Err(StoreError::DuplicateEmail),
            Err(err) => Err(StoreError::Other(
                anyhow::Error::new(err).context("failed to insert user"),
            )),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch user by id")?;
        Ok(row.as_ref().map(map_user))
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch user by email")?;
        Ok(row.as_ref().map(map_user))
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let query = r"
            UPDATE users
            SET email = $2,
                password_hash = $3,
                active = $4,
                superuser = $5,
                email_verified = $6,
                email_verification_token = $7,
                failed_attempts = $8,
                locked_until = $9,
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE"
        );
        let result = sqlx::query(query)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.active)
            .bind(user.superuser)
            .bind(user.email_verified)
            .bind(&user.email_verification_token)
            .bind(user.failed_attempts)
            .bind(user.locked_until)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::DuplicateEmail),
            Err(err) => Err(StoreError::Other(
                anyhow::Error::new(err).context("failed to update user"),
            )),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let query = "DELETE FROM users WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE"
        );
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete user")?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<User>, StoreError> {
        let query = format!(
            r"
            SELECT {USER_COLUMNS}
            FROM users
            ORDER BY created_at ASC
            OFFSET $1
            LIMIT $2
        "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let rows = sqlx::query(&query)
            .bind(offset)
            .bind(limit)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list users")?;
        Ok(rows.iter().map(map_user).collect())
    }

    async fn count_superusers(&self, only_active: bool) -> Result<i64, StoreError> {
        let query = r"
            SELECT COUNT(*)
            FROM users
            WHERE superuser = TRUE
              AND (active = TRUE OR $1 = FALSE)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let row = sqlx::query(query)
            .bind(only_active)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count superusers")?;
        Ok(row.get(0))
    }

    async fn consume_verification_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        // Single UPDATE keeps consumption atomic: a second call with the same
        // token matches no row.
        let query = format!(
            r"
            UPDATE users
            SET email_verified = TRUE,
                email_verification_token = NULL,
                updated_at = NOW()
            WHERE email_verification_token = $1
            RETURNING {USER_COLUMNS}
        "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE"
        );
        let row = sqlx::query(&query)
            .bind(token)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to consume verification token")?;
        Ok(row.as_ref().map(map_user))
    }
}

/// In-memory repository for tests and local development.
#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|user| user.email == email) {
            return Err(StoreError::DuplicateEmail);
        }
        let user = User::new(Uuid::new_v4(), email.to_string(), password_hash.to_string());
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if !users.contains_key(&user.id) {
            return Err(StoreError::Other(anyhow!("user not found: {}", user.id)));
        }
        if users
            .values()
            .any(|existing| existing.email == user.email && existing.id != user.id)
        {
            return Err(StoreError::DuplicateEmail);
        }
        let mut updated = user.clone();
        updated.updated_at = Utc::now();
        users.insert(updated.id, updated);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        Ok(users.remove(&id).is_some())
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<User>, StoreError> {
        let users = self.users.read().await;
        let mut all: Vec<User> = users.values().cloned().collect();
        all.sort_by_key(|user| user.created_at);
        Ok(all
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }

    async fn count_superusers(&self, only_active: bool) -> Result<i64, StoreError> {
        let users = self.users.read().await;
        let count = users
            .values()
            .filter(|user| user.superuser && (user.active || !only_active))
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn consume_verification_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        let id = users
            .values()
            .find(|user| user.email_verification_token.as_deref() == Some(token))
            .map(|user| user.id);

        let Some(id) = id else {
            return Ok(None);
        };

        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        user.email_verified = true;
        user.email_verification_token = None;
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }
}
