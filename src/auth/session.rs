//! Session establishment, validation, and teardown.
//!
//! Raw session tokens only travel in the cookie; storage sees the SHA-256
//! hash. Establishing a session always mints a fresh token (never the
//! pre-login identifier, which defeats fixation), and validation rotates
//! the identifier periodically without ending the logical session.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use super::account::{Account, Role};
use super::csrf::CsrfGuard;
use super::events::{SecurityEvent, SecurityEventSink};
use super::state::AuthConfig;
use super::types::ClientInfo;

/// Fully validated session; every field present and trusted.
#[derive(Clone, Debug)]
pub struct SessionRecord {
    pub account_id: Uuid,
    pub role: Role,
    pub login_name: String,
    pub auth_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub last_regenerated_at: DateTime<Utc>,
    pub bound_ip: Option<String>,
    pub lifetime_seconds: i64,
}

/// Raw row as read from storage. Fields stay optional until the integrity
/// check passes; a record with a missing required field is discarded, never
/// partially trusted.
#[derive(Clone, Debug, Default)]
pub struct StoredSession {
    pub account_id: Option<Uuid>,
    pub role: Option<String>,
    pub login_name: Option<String>,
    pub auth_time: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    pub last_regenerated_at: Option<DateTime<Utc>>,
    pub bound_ip: Option<String>,
    pub lifetime_seconds: Option<i64>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, key: &[u8], record: &SessionRecord) -> Result<()>;
    async fn fetch(&self, key: &[u8]) -> Result<Option<StoredSession>>;
    async fn touch(&self, key: &[u8], now: DateTime<Utc>) -> Result<()>;
    /// Swap the session identifier in place, preserving the logical session.
    async fn rekey(&self, old_key: &[u8], new_key: &[u8], now: DateTime<Utc>) -> Result<()>;
    /// Idempotent; deleting an unknown key is not an error.
    async fn delete(&self, key: &[u8]) -> Result<()>;
}

pub enum SessionValidation {
    Valid {
        session: SessionRecord,
        /// Raw replacement token when the identifier was rotated; the caller
        /// must re-set the cookie.
        rotated: Option<String>,
    },
    Invalid,
}

/// Create a new session token. The raw value is only returned to set the
/// cookie; storage keeps a hash.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Hash a session token so raw values never touch the database.
#[must_use]
pub fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

pub struct SessionGuard {
    store: Arc<dyn SessionStore>,
    events: Arc<dyn SecurityEventSink>,
    csrf: Arc<CsrfGuard>,
    session_lifetime_seconds: i64,
    remember_me_multiplier: i64,
    regeneration_interval_seconds: i64,
    bind_to_ip: bool,
}

impl SessionGuard {
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        events: Arc<dyn SecurityEventSink>,
        csrf: Arc<CsrfGuard>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            store,
            events,
            csrf,
            session_lifetime_seconds: config.session_lifetime_seconds(),
            remember_me_multiplier: config.remember_me_multiplier(),
            regeneration_interval_seconds: config.regeneration_interval_seconds(),
            bind_to_ip: config.bind_sessions_to_ip(),
        }
    }

    /// Establish a session for a freshly authenticated account.
    ///
    /// Returns the raw token for the cookie; only its hash is persisted.
    ///
    /// # Errors
    /// Fails closed when the session store is unreachable.
    pub async fn establish(
        &self,
        account: &Account,
        client: &ClientInfo,
        remember_me: bool,
    ) -> Result<String> {
        let token = generate_session_token()?;
        let key = hash_session_token(&token);
        let now = Utc::now();
        let lifetime = if remember_me {
            self.session_lifetime_seconds
                .saturating_mul(self.remember_me_multiplier)
        } else {
            self.session_lifetime_seconds
        };
        let record = SessionRecord {
            account_id: account.id,
            role: account.role,
            login_name: account.login_name.clone(),
            auth_time: now,
            last_activity: now,
            last_regenerated_at: now,
            bound_ip: if self.bind_to_ip {
                client.ip.clone()
            } else {
                None
            },
            lifetime_seconds: lifetime,
        };
        self.store.insert(&key, &record).await?;

        self.events.emit(
            SecurityEvent::new("session_established", client)
                .with_account(account.id, account.role)
                .with_data("remember_me", json!(remember_me)),
        );
        Ok(token)
    }

    /// Validate a presented token. Integrity failures, expiry, and IP
    /// mismatches all destroy the stored record before reporting `Invalid`.
    ///
    /// # Errors
    /// Fails closed when the session store is unreachable.
    pub async fn validate(&self, token: &str, client: &ClientInfo) -> Result<SessionValidation> {
        let key = hash_session_token(token);
        let Some(stored) = self.store.fetch(&key).await? else {
            return Ok(SessionValidation::Invalid);
        };

        let Some(mut session) = integrity_check(stored) else {
            self.store.delete(&key).await?;
            self.csrf.clear(&key).await;
            self.events
                .emit(SecurityEvent::new("session_integrity_failed", client));
            return Ok(SessionValidation::Invalid);
        };

        let now = Utc::now();
        let idle = now.signed_duration_since(session.last_activity);
        if idle > Duration::seconds(session.lifetime_seconds) {
            self.store.delete(&key).await?;
            self.csrf.clear(&key).await;
            self.events.emit(
                SecurityEvent::new("session_expired", client)
                    .with_account(session.account_id, session.role),
            );
            return Ok(SessionValidation::Invalid);
        }

        if self.bind_to_ip {
            if let Some(bound) = &session.bound_ip {
                if client.ip.as_deref() != Some(bound.as_str()) {
                    self.store.delete(&key).await?;
                    self.csrf.clear(&key).await;
                    self.events.emit(
                        SecurityEvent::new("session_ip_mismatch", client)
                            .with_account(session.account_id, session.role),
                    );
                    return Ok(SessionValidation::Invalid);
                }
            }
        }

        self.store.touch(&key, now).await?;
        session.last_activity = now;

        let since_regeneration = now.signed_duration_since(session.last_regenerated_at);
        let rotated = if since_regeneration >= Duration::seconds(self.regeneration_interval_seconds)
        {
            let replacement = generate_session_token()?;
            let new_key = hash_session_token(&replacement);
            self.store.rekey(&key, &new_key, now).await?;
            // The anti-forgery set follows the logical session: tokens issued
            // before rotation must still validate under the new identifier.
            self.csrf.rekey(&key, &new_key).await;
            session.last_regenerated_at = now;
            Some(replacement)
        } else {
            None
        };

        Ok(SessionValidation::Valid { session, rotated })
    }

    /// Destroy the session for `token`, if any, along with its anti-forgery
    /// tokens. Idempotent.
    ///
    /// # Errors
    /// Fails closed when the session store is unreachable.
    pub async fn destroy(&self, token: &str) -> Result<()> {
        let key = hash_session_token(token);
        self.store.delete(&key).await?;
        self.csrf.clear(&key).await;
        Ok(())
    }
}

fn integrity_check(stored: StoredSession) -> Option<SessionRecord> {
    let role: Role = stored.role.as_deref()?.parse().ok()?;
    let login_name = stored.login_name.filter(|name| !name.is_empty())?;
    Some(SessionRecord {
        account_id: stored.account_id?,
        role,
        login_name,
        auth_time: stored.auth_time?,
        last_activity: stored.last_activity?,
        last_regenerated_at: stored.last_regenerated_at?,
        bound_ip: stored.bound_ip,
        lifetime_seconds: stored.lifetime_seconds?,
    })
}

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, key: &[u8], record: &SessionRecord) -> Result<()> {
        let query = r"
            INSERT INTO sessions
                (session_hash, account_id, role, login_name, auth_time,
                 last_activity, last_regenerated_at, bound_ip, lifetime_seconds)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(key)
            .bind(record.account_id)
            .bind(record.role.as_str())
            .bind(&record.login_name)
            .bind(record.auth_time)
            .bind(record.last_activity)
            .bind(record.last_regenerated_at)
            .bind(record.bound_ip.as_deref())
            .bind(record.lifetime_seconds)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert session")?;
        Ok(())
    }

    async fn fetch(&self, key: &[u8]) -> Result<Option<StoredSession>> {
        let query = r"
            SELECT account_id, role, login_name, auth_time, last_activity,
                   last_regenerated_at, bound_ip, lifetime_seconds
            FROM sessions
            WHERE session_hash = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session")?;

        Ok(row.map(|row| StoredSession {
            account_id: row.get("account_id"),
            role: row.get("role"),
            login_name: row.get("login_name"),
            auth_time: row.get("auth_time"),
            last_activity: row.get("last_activity"),
            last_regenerated_at: row.get("last_regenerated_at"),
            bound_ip: row.get("bound_ip"),
            lifetime_seconds: row.get("lifetime_seconds"),
        }))
    }

    async fn touch(&self, key: &[u8], now: DateTime<Utc>) -> Result<()> {
        let query = "UPDATE sessions SET last_activity = $2 WHERE session_hash = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(key)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to refresh session activity")?;
        Ok(())
    }

    async fn rekey(&self, old_key: &[u8], new_key: &[u8], now: DateTime<Utc>) -> Result<()> {
        let query = r"
            UPDATE sessions
            SET session_hash = $2, last_regenerated_at = $3
            WHERE session_hash = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(old_key)
            .bind(new_key)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to rotate session identifier")?;
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        let query = "DELETE FROM sessions WHERE session_hash = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(key)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete session")?;
        Ok(())
    }
}
