use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::{extract_session_token, session_cookie};
use crate::auth::error::GENERIC_UNAVAILABLE_MESSAGE;
use crate::auth::types::{LoginRequest, LoginResponse, SanitizedAccountView};
use crate::auth::{AuthError, AuthState, ClientInfo};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated, session cookie set", body = LoginResponse),
        (status = 400, description = "Malformed credentials", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = LoginResponse),
        (status = 429, description = "Too many attempts", body = LoginResponse),
        (status = 503, description = "Storage unavailable", body = LoginResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<LoginRequest>,
) -> impl IntoResponse {
    let client = ClientInfo::from_headers(&headers);

    let account = match auth_state
        .service()
        .attempt(request.role, &request.login_name, &request.password, &client)
        .await
    {
        Ok(account) => account,
        Err(err) => {
            if let AuthError::StorageUnavailable(cause) = &err {
                error!("Login storage failure: {cause}");
            }
            return (err.status(), Json(LoginResponse::failure(err.user_message())))
                .into_response();
        }
    };

    // A pre-login session identifier must never survive authentication;
    // drop the old record (and its anti-forgery tokens) before minting.
    if let Some(previous) = extract_session_token(&headers) {
        if let Err(err) = auth_state.sessions().destroy(&previous).await {
            error!("Failed to destroy pre-login session: {err}");
        }
    }

    let token = match auth_state
        .sessions()
        .establish(&account, &client, request.remember_me)
        .await
    {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to establish session: {err}");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(LoginResponse::failure(GENERIC_UNAVAILABLE_MESSAGE)),
            )
                .into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    match session_cookie(auth_state.config(), &token) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(LoginResponse::failure(GENERIC_UNAVAILABLE_MESSAGE)),
            )
                .into_response();
        }
    }

    let view = SanitizedAccountView::from_account(&account);
    (
        StatusCode::OK,
        response_headers,
        Json(LoginResponse::success(view)),
    )
        .into_response()
}
