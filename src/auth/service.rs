//! Login state machine composing the account store, rate limiter, and
//! credential verifier.
//!
//! Per account: `Active(failed=0) -> Active(failed=n) -> Locked(until)` and
//! back to `Active(failed=0)` once the lock elapses and a correct password
//! arrives. Every failure mode a caller can probe for collapses into one
//! generic message.

use anyhow::Result;
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{Duration as ChronoDuration, Utc};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use super::account::{Account, AccountStore, Role, RoleSelector};
use super::credentials::CredentialVerifier;
use super::error::AuthError;
use super::events::{SecurityEvent, SecurityEventSink};
use super::rate_limit::RateLimiter;
use super::state::AuthConfig;
use super::types::ClientInfo;

const MAX_LOGIN_NAME_LENGTH: usize = 50;
const MAX_PASSWORD_LENGTH: usize = 255;

pub struct AuthenticationService {
    accounts: Arc<dyn AccountStore>,
    verifier: CredentialVerifier,
    limiter: Arc<dyn RateLimiter>,
    events: Arc<dyn SecurityEventSink>,
    max_failed_attempts: u32,
    lockout_seconds: i64,
    rate_limit_attempts: u32,
    rate_limit_window: Duration,
}

impl AuthenticationService {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        verifier: CredentialVerifier,
        limiter: Arc<dyn RateLimiter>,
        events: Arc<dyn SecurityEventSink>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            accounts,
            verifier,
            limiter,
            events,
            max_failed_attempts: config.max_failed_attempts(),
            lockout_seconds: config.lockout_seconds(),
            rate_limit_attempts: config.rate_limit_attempts(),
            rate_limit_window: Duration::from_secs(config.rate_limit_window_seconds()),
        }
    }

    /// Run one login attempt.
    ///
    /// The `personnel` selector cascades over its concrete roles: first
    /// success wins, and when every candidate fails the last candidate's
    /// failure is the one reported (the messages are generic either way).
    ///
    /// # Errors
    /// Every failure mode is an [`AuthError`]; see the module docs for how
    /// they collapse into user-facing messages.
    pub async fn attempt(
        &self,
        selector: RoleSelector,
        login_name: &str,
        password: &SecretString,
        client: &ClientInfo,
    ) -> Result<Account, AuthError> {
        if !valid_login_name(login_name) || !valid_password(password) {
            return Err(AuthError::InputInvalid);
        }

        let mut last_failure = AuthError::CredentialMismatch;
        for role in selector.candidates() {
            match self.attempt_role(*role, login_name, password, client).await {
                Ok(account) => return Ok(account),
                Err(err) => last_failure = err,
            }
        }
        Err(last_failure)
    }

    async fn attempt_role(
        &self,
        role: Role,
        login_name: &str,
        password: &SecretString,
        client: &ClientInfo,
    ) -> Result<Account, AuthError> {
        // Throttle before touching the account store; refused attempts are
        // cheap and learn nothing, not even the remaining budget.
        let key = throttle_key(role, login_name, client);
        if !self
            .limiter
            .allow(&key, self.rate_limit_attempts, self.rate_limit_window)
        {
            self.events
                .emit(SecurityEvent::new("auth_rate_limited", client)
                    .with_data("role", json!(role.as_str())));
            return Err(AuthError::RateLimited);
        }

        let account = self.accounts.find_active_by_login(role, login_name).await?;

        let Some(account) = account else {
            // Unknown and inactive accounts burn a dummy verification so
            // their latency matches the wrong-password path.
            self.verifier.verify_or_dummy(password, None);
            self.events
                .emit(SecurityEvent::new("auth_failed", client).with_data("role", json!(role.as_str())));
            return Err(AuthError::CredentialMismatch);
        };

        let now = Utc::now();
        if account.is_locked(now) {
            // Verify anyway and discard the result; a locked account must
            // not be distinguishable by timing, and the failure counter is
            // neither incremented nor reset on this path.
            let _ = self.verifier.verify(password, &account.password_hash);
            self.events.emit(
                SecurityEvent::new("auth_account_locked", client)
                    .with_account(account.id, account.role),
            );
            return Err(AuthError::AccountLocked);
        }

        if !self.verifier.verify(password, &account.password_hash) {
            let failures = self.accounts.record_failure(role, account.id).await?;
            if failures >= self.max_failed_attempts {
                let until = now + ChronoDuration::seconds(self.lockout_seconds);
                self.accounts.set_lock(role, account.id, until).await?;
            }
            self.events.emit(
                SecurityEvent::new("auth_failed", client)
                    .with_account(account.id, account.role)
                    .with_data("failed_attempts", json!(failures)),
            );
            return Err(AuthError::CredentialMismatch);
        }

        self.accounts.record_success(role, account.id).await?;
        self.events.emit(
            SecurityEvent::new("auth_success", client).with_account(account.id, account.role),
        );

        Ok(Account {
            failed_attempts: 0,
            locked_until: None,
            last_login: Some(now),
            ..account
        })
    }
}

/// Rate-limit key for one (role, login name, origin) tuple. Only a digest
/// of the identity leaves the request path.
fn throttle_key(role: Role, login_name: &str, client: &ClientInfo) -> String {
    let mut hasher = Sha256::new();
    hasher.update(login_name.as_bytes());
    if let Some(ip) = &client.ip {
        hasher.update(ip.as_bytes());
    }
    let digest = hasher.finalize();
    format!(
        "login:{}:{}",
        role.as_str(),
        Base64UrlUnpadded::encode_string(&digest)
    )
}

fn valid_login_name(login_name: &str) -> bool {
    if login_name.is_empty() || login_name.len() > MAX_LOGIN_NAME_LENGTH {
        return false;
    }
    Regex::new(r"^[\w.@-]+$").is_ok_and(|regex| regex.is_match(login_name))
}

fn valid_password(password: &SecretString) -> bool {
    let length = password.expose_secret().len();
    length > 0 && length <= MAX_PASSWORD_LENGTH
}
