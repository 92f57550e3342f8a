use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated principal, inserted into request extensions by
/// [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
}

/// Bearer-token guard for the session-management endpoints. The access
/// credential is self-contained: signature and expiry checks only, no store
/// lookup.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_from_header(req.headers()).ok_or(ApiError::Unauthorized)?;
    let claims = state
        .jwt
        .verify(&token)
        .map_err(|_| ApiError::Unauthorized)?;
    let id = Uuid::parse_str(&claims.sub).map_err(|_| ApiError::Unauthorized)?;

    req.extensions_mut().insert(CurrentUser {
        id,
        email: claims.email,
    });
    Ok(next.run(req).await)
}

fn bearer_from_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}
