use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::{extract_session_token, session_cookie};
use crate::auth::session::hash_session_token;
use crate::auth::types::CsrfResponse;
use crate::auth::{AuthState, ClientInfo, SessionValidation};

#[utoipa::path(
    get,
    path = "/v1/auth/csrf",
    responses(
        (status = 200, description = "Fresh anti-forgery token", body = CsrfResponse),
        (status = 401, description = "No active session"),
        (status = 503, description = "Storage unavailable")
    ),
    tag = "auth"
)]
pub async fn csrf_token(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let Some(token) = extract_session_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let client = ClientInfo::from_headers(&headers);

    let rotated = match auth_state.sessions().validate(&token, &client).await {
        Ok(SessionValidation::Valid { rotated, .. }) => rotated,
        Ok(SessionValidation::Invalid) => return StatusCode::UNAUTHORIZED.into_response(),
        Err(err) => {
            error!("Failed to validate session: {err}");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    // Bind the token to whichever identifier the client will present next.
    let current = rotated.as_deref().unwrap_or(&token);
    let csrf = match auth_state.csrf().issue(&hash_session_token(current)).await {
        Ok(csrf) => csrf,
        Err(err) => {
            error!("Failed to issue csrf token: {err}");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    if let Some(replacement) = &rotated {
        match session_cookie(auth_state.config(), replacement) {
            Ok(cookie) => {
                response_headers.insert(SET_COOKIE, cookie);
            }
            Err(err) => error!("Failed to build rotated session cookie: {err}"),
        }
    }
    (
        StatusCode::OK,
        response_headers,
        Json(CsrfResponse { csrf_token: csrf }),
    )
        .into_response()
}
