//! Authentication API endpoints
//!
//! - POST /api/signup - Register a user
//! - POST /api/login - Exchange credentials for a session token
//! - POST /api/logout - Revoke a session token
//! - GET /api/user - Current user

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{
    clear_session_cookie, extract_session_token, parse_optional_body, session_cookie, ApiError,
    ApiJson, AppState, AuthenticatedUser,
};
use crate::api::responses::{LoginResponse, UserResponse};
use crate::services::user::{LoginInput, RegisterInput};

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    pub token: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/user", get(current_user))
}

/// POST /api/signup
async fn signup(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .user_service
        .register(RegisterInput {
            username: body.username,
            email: body.email,
            password: body.password,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// POST /api/login
///
/// Returns the token in the body and also sets it as an HttpOnly cookie.
async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .user_service
        .authenticate(LoginInput {
            email: body.email,
            password: body.password,
        })
        .await?;

    let max_age = state.user_service.sessions().ttl().num_seconds();
    let cookie = session_cookie(&state.session_cookie, &session.id, max_age);
    let cookie = HeaderValue::from_str(&cookie).map_err(ApiError::internal)?;

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, cookie);

    Ok((
        headers,
        Json(LoginResponse {
            token: session.id,
            expires_at: session.expires_at,
        }),
    ))
}

/// POST /api/logout
///
/// The token comes from the body, or failing that from the bearer header or
/// cookie. Revoking an unknown token still succeeds.
async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: LogoutRequest = parse_optional_body(&body)?;
    let token = request
        .token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| extract_session_token(&headers, &state.session_cookie))
        .ok_or_else(|| ApiError::validation_error("A session token is required"))?;

    state.user_service.logout(&token).await?;

    let cookie = HeaderValue::from_str(&clear_session_cookie(&state.session_cookie))
        .map_err(ApiError::internal)?;
    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::SET_COOKIE, cookie);

    Ok((StatusCode::NO_CONTENT, response_headers))
}

/// GET /api/user
async fn current_user(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(user.0.into())
}
