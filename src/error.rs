use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::security::jwt::JwtError;
use crate::security::password::PasswordError;
use crate::session::{IssueError, RotationError, SessionError};
use crate::store::StoreError;

/// Request-level failure. Every variant maps to one status code and one
/// stable wire code so clients branch on data.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("password required")]
    PasswordRequired,
    #[error("refresh token required")]
    RefreshTokenRequired,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid refresh token")]
    InvalidRefreshToken,
    #[error("refresh token expired")]
    RefreshTokenExpired,
    #[error("refresh token reuse detected")]
    ReuseDetected,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("cannot revoke current session")]
    CannotRevokeCurrent,
    #[error("not found")]
    NotFound,
    #[error("email already exists")]
    EmailAlreadyExists,
    #[error("rate limited")]
    RateLimited,
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::PasswordRequired
            | ApiError::RefreshTokenRequired
            | ApiError::CannotRevokeCurrent => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials
            | ApiError::InvalidRefreshToken
            | ApiError::RefreshTokenExpired
            | ApiError::ReuseDetected
            | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::EmailAlreadyExists => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::PasswordRequired => "PASSWORD_REQUIRED",
            ApiError::RefreshTokenRequired => "REFRESH_TOKEN_REQUIRED",
            ApiError::InvalidCredentials => "INVALID_CREDENTIALS",
            ApiError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            ApiError::RefreshTokenExpired => "REFRESH_TOKEN_EXPIRED",
            ApiError::ReuseDetected => "REFRESH_TOKEN_REUSE_DETECTED",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::CannotRevokeCurrent => "CANNOT_REVOKE_CURRENT_SESSION",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::EmailAlreadyExists => "EMAIL_ALREADY_EXISTS",
            ApiError::RateLimited => "RATE_LIMITED",
            ApiError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::StoreUnavailable(detail) => {
                error!(detail = %detail, "store unavailable");
            }
            ApiError::Internal(detail) => {
                error!(detail = %detail, "internal error");
            }
            _ => {}
        }
        let body = Json(json!({ "ok": false, "error": self.code() }));
        (self.status(), body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => ApiError::EmailAlreadyExists,
            StoreError::Unavailable(detail) => ApiError::StoreUnavailable(detail),
        }
    }
}

impl From<RotationError> for ApiError {
    fn from(err: RotationError) -> Self {
        match err {
            RotationError::InvalidToken | RotationError::ConcurrentRotation => {
                ApiError::InvalidRefreshToken
            }
            RotationError::ReuseDetected => ApiError::ReuseDetected,
            RotationError::Expired => ApiError::RefreshTokenExpired,
            RotationError::Store(store) => store.into(),
            RotationError::Jwt(jwt) => jwt.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound => ApiError::NotFound,
            SessionError::CannotRevokeCurrent => ApiError::CannotRevokeCurrent,
            SessionError::Store(store) => store.into(),
        }
    }
}

impl From<IssueError> for ApiError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::Store(store) => store.into(),
            IssueError::Jwt(jwt) => jwt.into(),
        }
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
