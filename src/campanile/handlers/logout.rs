use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::{clear_session_cookie, extract_session_token};
use crate::auth::session::hash_session_token;
use crate::auth::types::LogoutRequest;
use crate::auth::{AuthState, ClientInfo, SecurityEvent};

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 204, description = "Session cleared"),
        (status = 403, description = "Anti-forgery token missing or invalid"),
        (status = 503, description = "Storage unavailable")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    request: Option<Json<LogoutRequest>>,
) -> impl IntoResponse {
    let client = ClientInfo::from_headers(&headers);

    // Without a session there is nothing to forge; answer as if the logout
    // succeeded and clear the cookie anyway.
    let Some(token) = extract_session_token(&headers) else {
        return (StatusCode::NO_CONTENT, cleared_cookie(&auth_state)).into_response();
    };
    let key = hash_session_token(&token);

    // Logout is state-changing, so it carries a single-use token like any
    // other mutating request.
    let supplied = request.map(|Json(body)| body.csrf_token).unwrap_or_default();
    if !auth_state.csrf().validate(&key, &supplied).await {
        auth_state
            .events()
            .emit(SecurityEvent::new("csrf_rejected", &client));
        return StatusCode::FORBIDDEN.into_response();
    }

    if let Err(err) = auth_state.sessions().destroy(&token).await {
        error!("Failed to destroy session: {err}");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    auth_state
        .events()
        .emit(SecurityEvent::new("logout", &client));

    (StatusCode::NO_CONTENT, cleared_cookie(&auth_state)).into_response()
}

fn cleared_cookie(auth_state: &AuthState) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match clear_session_cookie(auth_state.config()) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build clearing cookie: {err}"),
    }
    headers
}
