//! OpenAPI document for the auth endpoints.

use utoipa::OpenApi;

use crate::auth::account::{Role, RoleSelector};
use crate::auth::types::{
    CsrfResponse, LoginRequest, LoginResponse, LogoutRequest, SanitizedAccountView, SessionView,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        super::handlers::health::health,
        super::handlers::login::login,
        super::handlers::session::session,
        super::handlers::csrf_token::csrf_token,
        super::handlers::logout::logout,
    ),
    components(schemas(
        Role,
        RoleSelector,
        LoginRequest,
        LoginResponse,
        SanitizedAccountView,
        SessionView,
        CsrfResponse,
        LogoutRequest,
    )),
    tags(
        (name = "auth", description = "Login, session, and anti-forgery endpoints"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;
