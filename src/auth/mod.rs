//! Authentication and session security core.
//!
//! Everything security-sensitive about portal logins lives here: per-role
//! account stores, the login state machine with lockout and throttling,
//! session establishment/validation/rotation, single-use CSRF tokens, and
//! the security event log. The HTTP layer in `crate::campanile` is a thin
//! adapter over these types.

pub mod account;
pub mod credentials;
pub mod csrf;
pub mod error;
pub mod events;
pub mod rate_limit;
pub mod service;
pub mod session;
pub mod state;
pub mod types;

pub use account::{Account, AccountStore, PgAccountStore, Role, RoleSelector};
pub use credentials::CredentialVerifier;
pub use csrf::CsrfGuard;
pub use error::AuthError;
pub use events::{SecurityEvent, SecurityEventSink, TracingEventSink};
pub use rate_limit::{FixedWindowLimiter, NoopLimiter, RateLimiter};
pub use service::AuthenticationService;
pub use session::{SessionGuard, SessionStore, SessionValidation};
pub use state::{AuthConfig, AuthState};
pub use types::ClientInfo;
