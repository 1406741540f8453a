//! Request/response types for the auth endpoints.

use axum::http::{header::USER_AGENT, HeaderMap};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::account::{Account, Role, RoleSelector};

/// Login input contract: role selector, bounded login name and password.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub role: RoleSelector,
    pub login_name: String,
    #[schema(value_type = String, format = Password)]
    pub password: SecretString,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<SanitizedAccountView>,
}

impl LoginResponse {
    #[must_use]
    pub fn success(user: SanitizedAccountView) -> Self {
        Self {
            success: true,
            message: "Login successful".to_string(),
            user: Some(user),
        }
    }

    #[must_use]
    pub fn failure(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            user: None,
        }
    }
}

/// Account view safe to hand to templates: never the password hash, and all
/// free-text fields HTML-escaped.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct SanitizedAccountView {
    pub id: Uuid,
    pub role: Role,
    pub login_name: String,
    pub last_login: Option<DateTime<Utc>>,
}

impl SanitizedAccountView {
    #[must_use]
    pub fn from_account(account: &Account) -> Self {
        Self {
            id: account.id,
            role: account.role,
            login_name: html_escape(&account.login_name),
            last_login: account.last_login,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionView {
    pub user_id: Uuid,
    pub role: Role,
    pub login_name: String,
    pub auth_time: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CsrfResponse {
    pub csrf_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LogoutRequest {
    #[serde(default)]
    pub csrf_token: String,
}

/// Request metadata carried into the security core for throttling, IP
/// binding, and event logging.
#[derive(Clone, Debug, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    /// Extract client details from common proxy headers.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip: extract_client_ip(headers),
            user_agent: headers
                .get(USER_AGENT)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
        }
    }
}

fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Minimal HTML escaping for free-text fields in API responses.
#[must_use]
pub fn html_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn html_escape_covers_markup_characters() {
        assert_eq!(
            html_escape(r#"<b onclick="x('&')">"#),
            "&lt;b onclick=&quot;x(&#39;&amp;&#39;)&quot;&gt;"
        );
        assert_eq!(html_escape("alice.smith"), "alice.smith");
    }

    #[test]
    fn sanitized_view_escapes_login_name_and_drops_hash() {
        let account = Account {
            id: Uuid::new_v4(),
            role: Role::Student,
            login_name: "<alice>".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            active: true,
            failed_attempts: 0,
            locked_until: None,
            last_login: None,
        };
        let view = SanitizedAccountView::from_account(&account);
        assert_eq!(view.login_name, "&lt;alice&gt;");
        let json = serde_json::to_string(&view).expect("serialize");
        assert!(!json.contains("argon2id"));
    }

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        let client = ClientInfo::from_headers(&headers);
        assert_eq!(client.ip.as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        let client = ClientInfo::from_headers(&headers);
        assert_eq!(client.ip.as_deref(), Some("9.9.9.9"));
    }

    #[test]
    fn role_selector_parses_lowercase() {
        let selector: RoleSelector = serde_json::from_str("\"personnel\"").expect("parse");
        assert_eq!(selector, RoleSelector::Personnel);
    }
}
