pub mod health;
pub use self::health::health;

pub mod login;
pub use self::login::login;

pub mod session;
pub use self::session::session;

pub mod csrf_token;
pub use self::csrf_token::csrf_token;

pub mod logout;
pub use self::logout::logout;

// common functions for the handlers
use axum::http::{
    header::{InvalidHeaderValue, AUTHORIZATION, COOKIE},
    HeaderMap, HeaderValue,
};

use crate::auth::AuthConfig;

pub const SESSION_COOKIE_NAME: &str = "campanile_session";

/// Pull the session token from the cookie, falling back to a bearer header
/// for non-browser clients.
pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(cookies) = headers.get(COOKIE).and_then(|value| value.to_str().ok()) {
        for pair in cookies.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                if name == SESSION_COOKIE_NAME && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Build the `HttpOnly` session cookie. No `Max-Age` or `Expires`: the
/// cookie lives for the browser session and the server-side record is the
/// only authority on lifetime.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax");
    if config.secure_cookies() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.secure_cookies() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_takes_precedence_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; campanile_session=abc123"),
        );
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer other"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn bearer_fallback_without_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("tok"));
    }

    #[test]
    fn empty_cookie_value_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("campanile_session="));
        assert_eq!(extract_session_token(&headers), None);
    }

    #[test]
    fn session_cookie_has_no_max_age() {
        let config = AuthConfig::new();
        let cookie = session_cookie(&config, "tok").expect("cookie");
        let value = cookie.to_str().expect("ascii");
        assert!(value.contains("campanile_session=tok"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Lax"));
        assert!(!value.contains("Max-Age"));
        assert!(!value.contains("Secure"));
    }

    #[test]
    fn secure_flag_follows_config() {
        let config = AuthConfig::new().with_secure_cookies(true);
        let cookie = session_cookie(&config, "tok").expect("cookie");
        assert!(cookie.to_str().expect("ascii").contains("; Secure"));

        let cleared = clear_session_cookie(&config).expect("cookie");
        let value = cleared.to_str().expect("ascii");
        assert!(value.contains("Max-Age=0"));
        assert!(value.contains("; Secure"));
    }
}
