//! Error taxonomy for the authentication core.

use axum::http::StatusCode;
use thiserror::Error;

/// One message for every credential-shaped failure. Mismatch, lockout, and
/// "no such account" must be indistinguishable to prevent enumeration.
pub const GENERIC_CREDENTIALS_MESSAGE: &str = "Invalid credentials";
pub const GENERIC_THROTTLE_MESSAGE: &str = "Too many attempts, please try again later";
pub const GENERIC_UNAVAILABLE_MESSAGE: &str = "Service temporarily unavailable";
pub const GENERIC_FORBIDDEN_MESSAGE: &str = "Request rejected";

#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or oversized credentials; rejected before any lookup.
    #[error("invalid login input")]
    InputInvalid,

    /// Throttling threshold hit; the account store was never consulted.
    #[error("rate limited")]
    RateLimited,

    /// Lockout window active; refused regardless of password correctness.
    #[error("account locked")]
    AccountLocked,

    /// Wrong password or no such account.
    #[error("credential mismatch")]
    CredentialMismatch,

    /// Account or session storage unreachable; always fail closed.
    #[error("storage unavailable")]
    StorageUnavailable(#[from] anyhow::Error),

    /// Anti-forgery token missing, expired, or already consumed.
    #[error("csrf token missing or invalid")]
    CsrfInvalid,
}

impl AuthError {
    /// Message safe to show to the user.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InputInvalid | Self::AccountLocked | Self::CredentialMismatch => {
                GENERIC_CREDENTIALS_MESSAGE
            }
            Self::RateLimited => GENERIC_THROTTLE_MESSAGE,
            Self::StorageUnavailable(_) => GENERIC_UNAVAILABLE_MESSAGE,
            Self::CsrfInvalid => GENERIC_FORBIDDEN_MESSAGE,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InputInvalid => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::AccountLocked | Self::CredentialMismatch => StatusCode::UNAUTHORIZED,
            Self::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::CsrfInvalid => StatusCode::FORBIDDEN,
        }
    }
}
