//! Shared HTTP plumbing
//!
//! - [`AppState`]: services shared by every handler
//! - [`ApiError`]: the `{"error": {"code", "message"}}` body and its status
//! - [`AuthenticatedUser`]: resolves the caller from a bearer token or the
//!   session cookie
//! - [`ApiJson`]: JSON body extractor whose rejections are `VALIDATION_ERROR`

use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{Config, SessionConfig, SessionDriver};
use crate::db::repositories::{
    SessionRepository, SqlxSessionRepository, SqlxTaskRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    build_suggester, SessionStore, SuggestError, TagSuggester, TaskService, TaskServiceError,
    UserService, UserServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub task_service: Arc<TaskService>,
    pub suggester: Arc<dyn TagSuggester>,
    /// Name of the cookie carrying the session token
    pub session_cookie: Arc<str>,
}

impl AppState {
    /// Wire repositories and services on top of an open, migrated pool.
    pub async fn from_config(config: &Config, pool: DynDatabasePool) -> anyhow::Result<Self> {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let task_repo = SqlxTaskRepository::boxed(pool.clone());
        let session_repo = session_repository(&config.session, &pool).await?;

        let sessions = Arc::new(SessionStore::with_ttl(session_repo, config.session.ttl()));
        let user_service = Arc::new(UserService::new(user_repo.clone(), sessions));
        let task_service = Arc::new(TaskService::new(task_repo, user_repo));
        let suggester = build_suggester(&config.suggest)?;

        Ok(Self {
            pool,
            user_service,
            task_service,
            suggester,
            session_cookie: Arc::from(config.session.cookie_name.as_str()),
        })
    }
}

async fn session_repository(
    config: &SessionConfig,
    pool: &DynDatabasePool,
) -> anyhow::Result<Arc<dyn SessionRepository>> {
    match config.driver {
        SessionDriver::Database => Ok(SqlxSessionRepository::boxed(pool.clone())),
        #[cfg(feature = "redis-sessions")]
        SessionDriver::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| {
                    anyhow::anyhow!("session.redis_url is required for the redis driver")
                })?;
            let repo = crate::db::repositories::RedisSessionRepository::new(url).await?;
            tracing::info!("Using Redis session store");
            Ok(Arc::new(repo))
        }
        #[cfg(not(feature = "redis-sessions"))]
        SessionDriver::Redis => {
            anyhow::bail!("session.driver is redis but the redis-sessions feature is not enabled")
        }
    }
}

/// Seconds a client should wait before retrying a 503
const RETRY_AFTER_SECS: u64 = 30;

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
    #[serde(skip)]
    pub retry_after: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
            retry_after: None,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    /// Log the real cause and hide it from the client
    pub fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "Internal error while handling request");
        Self::new("INTERNAL_ERROR", "An internal error occurred")
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            retry_after: Some(RETRY_AFTER_SECS),
            ..Self::new("SUGGESTION_UNAVAILABLE", message)
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" | "ALREADY_JOINED" | "TASK_FULL" => StatusCode::CONFLICT,
            "SUGGESTION_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = self.retry_after;
        let mut response = (status, Json(self)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::Validation(msg) => Self::validation_error(msg),
            UserServiceError::Conflict(msg) => Self::conflict(msg),
            UserServiceError::InvalidCredentials => Self::unauthorized("Invalid email or password"),
            UserServiceError::Unauthorized => Self::unauthorized("Invalid or expired session"),
            UserServiceError::Internal(e) => Self::internal(format!("{:#}", e)),
        }
    }
}

impl From<TaskServiceError> for ApiError {
    fn from(err: TaskServiceError) -> Self {
        match err {
            TaskServiceError::Validation(msg) => Self::validation_error(msg),
            TaskServiceError::NotFound(what) => Self::not_found(format!("{} not found", what)),
            TaskServiceError::TaskFull => Self::new("TASK_FULL", "Task is full"),
            TaskServiceError::AlreadyJoined => {
                Self::new("ALREADY_JOINED", "User has already joined this task")
            }
            TaskServiceError::Internal(e) => Self::internal(format!("{:#}", e)),
        }
    }
}

impl From<SuggestError> for ApiError {
    fn from(err: SuggestError) -> Self {
        match err {
            SuggestError::Validation(msg) => Self::validation_error(msg),
            SuggestError::Unavailable(_) => {
                Self::unavailable("Tag suggestions are temporarily unavailable")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation_error(rejection.body_text())
    }
}

/// JSON request body; malformed input becomes `400 VALIDATION_ERROR`
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Parse an optional JSON body. An empty body yields `T::default()`.
pub fn parse_optional_body<T>(body: &[u8]) -> Result<T, ApiError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::validation_error(format!("Invalid JSON body: {}", e)))
}

/// Extract the session token: `Authorization: Bearer` first, then the cookie.
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|c| c.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value carrying a fresh session token
pub fn session_cookie(name: &str, token: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        name, token, max_age_secs
    )
}

/// `Set-Cookie` value that removes the session cookie
pub fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0", name)
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_session_token(&parts.headers, &state.session_cookie)
            .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

        let user = state.user_service.who_am_i(&token).await?;
        Ok(Self(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_bearer_token() {
        let h = headers(&[(header::AUTHORIZATION, "Bearer abc-123")]);
        assert_eq!(extract_session_token(&h, "token"), Some("abc-123".to_string()));
    }

    #[test]
    fn test_cookie_token() {
        let h = headers(&[(header::COOKIE, "theme=dark; token=xyz; other=1")]);
        assert_eq!(extract_session_token(&h, "token"), Some("xyz".to_string()));
    }

    #[test]
    fn test_bearer_takes_priority_over_cookie() {
        let h = headers(&[
            (header::COOKIE, "token=from-cookie"),
            (header::AUTHORIZATION, "Bearer from-header"),
        ]);
        assert_eq!(
            extract_session_token(&h, "token"),
            Some("from-header".to_string())
        );
    }

    #[test]
    fn test_custom_cookie_name_and_missing_token() {
        let h = headers(&[(header::COOKIE, "token=abc")]);
        assert_eq!(extract_session_token(&h, "sid"), None);
        assert_eq!(extract_session_token(&HeaderMap::new(), "token"), None);

        let h = headers(&[(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")]);
        assert_eq!(extract_session_token(&h, "token"), None);
    }

    #[test]
    fn test_empty_cookie_value_ignored() {
        let h = headers(&[(header::COOKIE, "token=")]);
        assert_eq!(extract_session_token(&h, "token"), None);
    }

    #[test]
    fn test_cookie_strings() {
        assert_eq!(
            session_cookie("token", "abc", 86400),
            "token=abc; HttpOnly; Path=/; SameSite=Lax; Max-Age=86400"
        );
        assert!(clear_session_cookie("token").ends_with("Max-Age=0"));
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(TaskServiceError::TaskFull).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(TaskServiceError::AlreadyJoined).error.code,
            "ALREADY_JOINED"
        );
        assert_eq!(
            ApiError::from(UserServiceError::Conflict("taken".into())).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_internal_error_hides_details() {
        let err = ApiError::from(TaskServiceError::Internal(anyhow::anyhow!(
            "database is locked at /var/lib/secret.db"
        )));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.error.message.contains("secret"));
    }

    #[test]
    fn test_unavailable_sets_retry_after() {
        let response =
            ApiError::from(SuggestError::Unavailable("timeout".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            &HeaderValue::from(RETRY_AFTER_SECS)
        );
    }

    #[test]
    fn test_parse_optional_body() {
        #[derive(Debug, Default, Deserialize, PartialEq)]
        struct Body {
            value: Option<u32>,
        }

        assert_eq!(parse_optional_body::<Body>(b"").unwrap(), Body::default());
        assert_eq!(parse_optional_body::<Body>(b"  \n").unwrap(), Body::default());
        assert_eq!(
            parse_optional_body::<Body>(br#"{"value": 3}"#).unwrap(),
            Body { value: Some(3) }
        );
        assert!(parse_optional_body::<Body>(b"{oops").is_err());
    }
}
