//! Auth configuration and shared state.

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use super::account::{AccountStore, PgAccountStore};
use super::credentials::CredentialVerifier;
use super::csrf::CsrfGuard;
use super::events::{SecurityEventSink, TracingEventSink};
use super::rate_limit::{FixedWindowLimiter, RateLimiter};
use super::service::AuthenticationService;
use super::session::{PgSessionStore, SessionGuard, SessionStore};

const DEFAULT_SESSION_LIFETIME_SECONDS: i64 = 3600;
const DEFAULT_REMEMBER_ME_MULTIPLIER: i64 = 24;
const DEFAULT_REGENERATION_INTERVAL_SECONDS: i64 = 300;
const DEFAULT_CSRF_LIFETIME_SECONDS: u64 = 3600;
const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 5;
const DEFAULT_LOCKOUT_SECONDS: i64 = 30 * 60;
const DEFAULT_RATE_LIMIT_ATTEMPTS: u32 = 5;
const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 300;

/// One canonical policy for the whole portal. The legacy system carried
/// several divergent copies of these numbers; anything that needs a
/// different policy gets it from here, not from a local redefinition.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    session_lifetime_seconds: i64,
    remember_me_multiplier: i64,
    regeneration_interval_seconds: i64,
    csrf_lifetime_seconds: u64,
    max_failed_attempts: u32,
    lockout_seconds: i64,
    rate_limit_attempts: u32,
    rate_limit_window_seconds: u64,
    bind_sessions_to_ip: bool,
    secure_cookies: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_lifetime_seconds: DEFAULT_SESSION_LIFETIME_SECONDS,
            remember_me_multiplier: DEFAULT_REMEMBER_ME_MULTIPLIER,
            regeneration_interval_seconds: DEFAULT_REGENERATION_INTERVAL_SECONDS,
            csrf_lifetime_seconds: DEFAULT_CSRF_LIFETIME_SECONDS,
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            lockout_seconds: DEFAULT_LOCKOUT_SECONDS,
            rate_limit_attempts: DEFAULT_RATE_LIMIT_ATTEMPTS,
            rate_limit_window_seconds: DEFAULT_RATE_LIMIT_WINDOW_SECONDS,
            bind_sessions_to_ip: false,
            secure_cookies: false,
        }
    }

    #[must_use]
    pub fn with_session_lifetime_seconds(mut self, seconds: i64) -> Self {
        self.session_lifetime_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_remember_me_multiplier(mut self, multiplier: i64) -> Self {
        self.remember_me_multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn with_regeneration_interval_seconds(mut self, seconds: i64) -> Self {
        self.regeneration_interval_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_csrf_lifetime_seconds(mut self, seconds: u64) -> Self {
        self.csrf_lifetime_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_max_failed_attempts(mut self, attempts: u32) -> Self {
        self.max_failed_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_lockout_seconds(mut self, seconds: i64) -> Self {
        self.lockout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, attempts: u32, window_seconds: u64) -> Self {
        self.rate_limit_attempts = attempts;
        self.rate_limit_window_seconds = window_seconds;
        self
    }

    #[must_use]
    pub fn with_bind_sessions_to_ip(mut self, enabled: bool) -> Self {
        self.bind_sessions_to_ip = enabled;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, enabled: bool) -> Self {
        self.secure_cookies = enabled;
        self
    }

    pub(crate) fn session_lifetime_seconds(&self) -> i64 {
        self.session_lifetime_seconds
    }

    pub(crate) fn remember_me_multiplier(&self) -> i64 {
        self.remember_me_multiplier
    }

    pub(crate) fn regeneration_interval_seconds(&self) -> i64 {
        self.regeneration_interval_seconds
    }

    pub(crate) fn csrf_lifetime_seconds(&self) -> u64 {
        self.csrf_lifetime_seconds
    }

    pub(crate) fn max_failed_attempts(&self) -> u32 {
        self.max_failed_attempts
    }

    pub(crate) fn lockout_seconds(&self) -> i64 {
        self.lockout_seconds
    }

    pub(crate) fn rate_limit_attempts(&self) -> u32 {
        self.rate_limit_attempts
    }

    pub(crate) fn rate_limit_window_seconds(&self) -> u64 {
        self.rate_limit_window_seconds
    }

    pub(crate) fn bind_sessions_to_ip(&self) -> bool {
        self.bind_sessions_to_ip
    }

    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }
}

/// Everything the HTTP layer needs, passed explicitly instead of living in
/// process-wide globals.
pub struct AuthState {
    config: AuthConfig,
    service: AuthenticationService,
    sessions: SessionGuard,
    csrf: Arc<CsrfGuard>,
    events: Arc<dyn SecurityEventSink>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        accounts: Arc<dyn AccountStore>,
        sessions: Arc<dyn SessionStore>,
        limiter: Arc<dyn RateLimiter>,
        events: Arc<dyn SecurityEventSink>,
    ) -> Self {
        let service = AuthenticationService::new(
            accounts,
            CredentialVerifier::new(),
            limiter,
            events.clone(),
            &config,
        );
        let csrf = Arc::new(CsrfGuard::new(Duration::from_secs(
            config.csrf_lifetime_seconds(),
        )));
        let guard = SessionGuard::new(sessions, events.clone(), csrf.clone(), &config);
        Self {
            config,
            service,
            sessions: guard,
            csrf,
            events,
        }
    }

    /// Wire the core against Postgres-backed stores, the default for a
    /// running portal.
    #[must_use]
    pub fn postgres(config: AuthConfig, pool: PgPool) -> Self {
        Self::new(
            config,
            Arc::new(PgAccountStore::new(pool.clone())),
            Arc::new(PgSessionStore::new(pool)),
            Arc::new(FixedWindowLimiter::new()),
            Arc::new(TracingEventSink),
        )
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn service(&self) -> &AuthenticationService {
        &self.service
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionGuard {
        &self.sessions
    }

    #[must_use]
    pub fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    #[must_use]
    pub fn events(&self) -> &Arc<dyn SecurityEventSink> {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_canonical_policy() {
        let config = AuthConfig::new();
        assert_eq!(config.session_lifetime_seconds(), 3600);
        assert_eq!(config.regeneration_interval_seconds(), 300);
        assert_eq!(config.csrf_lifetime_seconds(), 3600);
        assert_eq!(config.max_failed_attempts(), 5);
        assert_eq!(config.lockout_seconds(), 1800);
        assert_eq!(config.rate_limit_attempts(), 5);
        assert_eq!(config.rate_limit_window_seconds(), 300);
        assert!(!config.bind_sessions_to_ip());
        assert!(!config.secure_cookies());
    }

    #[test]
    fn builders_override_defaults() {
        let config = AuthConfig::new()
            .with_session_lifetime_seconds(60)
            .with_remember_me_multiplier(2)
            .with_regeneration_interval_seconds(10)
            .with_csrf_lifetime_seconds(120)
            .with_max_failed_attempts(3)
            .with_lockout_seconds(600)
            .with_rate_limit(10, 60)
            .with_bind_sessions_to_ip(true)
            .with_secure_cookies(true);

        assert_eq!(config.session_lifetime_seconds(), 60);
        assert_eq!(config.remember_me_multiplier(), 2);
        assert_eq!(config.regeneration_interval_seconds(), 10);
        assert_eq!(config.csrf_lifetime_seconds(), 120);
        assert_eq!(config.max_failed_attempts(), 3);
        assert_eq!(config.lockout_seconds(), 600);
        assert_eq!(config.rate_limit_attempts(), 10);
        assert_eq!(config.rate_limit_window_seconds(), 60);
        assert!(config.bind_sessions_to_ip());
        assert!(config.secure_cookies());
    }
}
