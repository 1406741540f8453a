//! Per-role account stores.
//!
//! One table per role; `login_name` is unique within its table. This module
//! is the only writer of the account security fields (failure counter, lock
//! timestamp, last login). Accounts are provisioned elsewhere and never
//! deleted by this core, only deactivated.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::fmt;
use std::str::FromStr;
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Parent,
    Teacher,
    Staff,
    Admin,
}

impl Role {
    /// Table holding this role's accounts.
    pub(crate) fn table(self) -> &'static str {
        match self {
            Self::Student => "students",
            Self::Parent => "parents",
            Self::Teacher => "teachers",
            Self::Staff => "staff",
            Self::Admin => "admins",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Parent => "parent",
            Self::Teacher => "teacher",
            Self::Staff => "staff",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "student" => Ok(Self::Student),
            "parent" => Ok(Self::Parent),
            "teacher" => Ok(Self::Teacher),
            "staff" => Ok(Self::Staff),
            "admin" => Ok(Self::Admin),
            _ => Err(()),
        }
    }
}

/// Role requested at login. `Personnel` is the composite selector that
/// cascades over the teacher and staff stores.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoleSelector {
    Student,
    Parent,
    Teacher,
    Staff,
    Admin,
    Personnel,
}

impl RoleSelector {
    /// Concrete stores consulted for this selector, in order. The first
    /// success wins; when every candidate fails, the last failure is the
    /// one reported.
    #[must_use]
    pub fn candidates(self) -> &'static [Role] {
        match self {
            Self::Student => &[Role::Student],
            Self::Parent => &[Role::Parent],
            Self::Teacher => &[Role::Teacher],
            Self::Staff => &[Role::Staff],
            Self::Admin => &[Role::Admin],
            Self::Personnel => &[Role::Teacher, Role::Staff],
        }
    }
}

#[derive(Clone, Debug)]
pub struct Account {
    pub id: Uuid,
    pub role: Role,
    pub login_name: String,
    pub password_hash: String,
    pub active: bool,
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
}

impl Account {
    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Look up an active account. Inactive accounts behave exactly like
    /// missing ones so the caller learns nothing from the distinction.
    async fn find_active_by_login(&self, role: Role, login_name: &str)
        -> Result<Option<Account>>;

    /// Increment the failure counter and return the new value. Must be a
    /// single atomic statement so concurrent attempts never lose a count.
    async fn record_failure(&self, role: Role, id: Uuid) -> Result<u32>;

    /// Reset the failure counter, clear any lock, and stamp the login time.
    async fn record_success(&self, role: Role, id: Uuid) -> Result<()>;

    /// Lock the account until the given instant.
    async fn set_lock(&self, role: Role, id: Uuid, until: DateTime<Utc>) -> Result<()>;
}

pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_active_by_login(
        &self,
        role: Role,
        login_name: &str,
    ) -> Result<Option<Account>> {
        let query = format!(
            "SELECT id, login_name, password_hash, active, failed_attempts, locked_until, last_login \
             FROM {} WHERE login_name = $1 AND active = TRUE",
            role.table()
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(login_name)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup account")?;

        Ok(row.map(|row| Account {
            id: row.get("id"),
            role,
            login_name: row.get("login_name"),
            password_hash: row.get("password_hash"),
            active: row.get("active"),
            failed_attempts: u32::try_from(row.get::<i32, _>("failed_attempts")).unwrap_or(0),
            locked_until: row.get("locked_until"),
            last_login: row.get("last_login"),
        }))
    }

    async fn record_failure(&self, role: Role, id: Uuid) -> Result<u32> {
        // Single statement so parallel login attempts never lose an
        // increment to a read-modify-write race.
        let query = format!(
            "UPDATE {} SET failed_attempts = failed_attempts + 1 WHERE id = $1 RETURNING failed_attempts",
            role.table()
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login failure")?;

        Ok(u32::try_from(row.get::<i32, _>("failed_attempts")).unwrap_or(u32::MAX))
    }

    async fn record_success(&self, role: Role, id: Uuid) -> Result<()> {
        let query = format!(
            "UPDATE {} SET failed_attempts = 0, locked_until = NULL, last_login = NOW() WHERE id = $1",
            role.table()
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = %query
        );
        sqlx::query(&query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login success")?;
        Ok(())
    }

    async fn set_lock(&self, role: Role, id: Uuid, until: DateTime<Utc>) -> Result<()> {
        let query = format!(
            "UPDATE {} SET locked_until = $2 WHERE id = $1",
            role.table()
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = %query
        );
        sqlx::query(&query)
            .bind(id)
            .bind(until)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to lock account")?;
        Ok(())
    }
}
