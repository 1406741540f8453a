use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::{extract_session_token, session_cookie};
use crate::auth::types::SessionView;
use crate::auth::{AuthState, ClientInfo, SessionValidation};

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionView),
        (status = 204, description = "No active session"),
        (status = 503, description = "Storage unavailable")
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // Missing cookies are treated as "no session" to avoid leaking auth state.
    let Some(token) = extract_session_token(&headers) else {
        return StatusCode::NO_CONTENT.into_response();
    };
    let client = ClientInfo::from_headers(&headers);

    match auth_state.sessions().validate(&token, &client).await {
        Ok(SessionValidation::Valid { session, rotated }) => {
            let view = SessionView {
                user_id: session.account_id,
                role: session.role,
                login_name: session.login_name,
                auth_time: session.auth_time,
            };
            let mut response_headers = HeaderMap::new();
            if let Some(replacement) = rotated {
                match session_cookie(auth_state.config(), &replacement) {
                    Ok(cookie) => {
                        response_headers.insert(SET_COOKIE, cookie);
                    }
                    Err(err) => error!("Failed to build rotated session cookie: {err}"),
                }
            }
            (StatusCode::OK, response_headers, Json(view)).into_response()
        }
        Ok(SessionValidation::Invalid) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            // Fail closed; an unreachable store never passes a session.
            error!("Failed to validate session: {err}");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}
