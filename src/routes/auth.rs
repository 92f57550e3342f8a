use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::ClientInfo;
use crate::error::ApiError;
use crate::infra::audit::AuditEvent;
use crate::middleware::auth::CurrentUser;
use crate::security::{cookies, csrf, rate_limit, secret};
use crate::session::IssuedTokens;
use crate::state::AppState;

#[derive(Deserialize)]
pub(crate) struct RegisterBody {
    email: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginBody {
    email: String,
    password: Option<String>,
    return_refresh_token: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshBody {
    refresh_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserView {
    id: Uuid,
    email: String,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    ok: bool,
    access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

pub async fn csrf_token(State(state): State<Arc<AppState>>) -> Response {
    let token = csrf::issue_token();
    let mut res = Json(json!({ "ok": true, "csrfToken": token })).into_response();
    cookies::set_signed(
        res.headers_mut(),
        &state.security,
        &state.security.csrf_cookie_name,
        &token,
        None,
    );
    res
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Json(body): Json<RegisterBody>,
) -> Result<Response, ApiError> {
    validate_email(&body.email)?;
    validate_password(&body.password)?;
    throttle(&client, "register", 20)?;

    let digest = crate::security::password::hash_password(&body.password)?;
    let identity = state
        .store
        .create_identity(&body.email, Some(digest))
        .await?;

    state
        .audit
        .record(
            AuditEvent::new("auth.register", client)
                .user(identity.id)
                .meta(json!({ "email": identity.email.clone() })),
        )
        .await;

    let body = Json(json!({
        "ok": true,
        "user": UserView {
            id: identity.id,
            email: identity.email,
            created_at: identity.created_at,
        },
    }));
    Ok((StatusCode::CREATED, body).into_response())
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Json(body): Json<LoginBody>,
) -> Result<Response, ApiError> {
    validate_email(&body.email)?;
    throttle(&client, "login", 30)?;

    let existing = state.store.identity_by_email(&body.email).await?;

    let (identity, method) = match existing {
        None => {
            if !state.config.allow_dev_login {
                return Err(ApiError::InvalidCredentials);
            }
            let created = state.store.create_identity(&body.email, None).await?;
            (created, "dev")
        }
        Some(identity) if identity.is_passwordless() => {
            if !state.config.allow_dev_login {
                return Err(ApiError::InvalidCredentials);
            }
            (identity, "dev")
        }
        Some(identity) => {
            let password = body.password.as_deref().ok_or(ApiError::PasswordRequired)?;
            let digest = identity
                .password_digest
                .as_deref()
                .ok_or(ApiError::InvalidCredentials)?;
            if !crate::security::password::verify_password(password, digest)? {
                return Err(ApiError::InvalidCredentials);
            }
            (identity, "password")
        }
    };

    let tokens = state.issuer.issue(&identity, &client).await?;

    state
        .audit
        .record(
            AuditEvent::new("auth.login", client)
                .user(identity.id)
                .meta(json!({ "method": method, "email": identity.email })),
        )
        .await;

    Ok(tokens_response(
        &state,
        tokens,
        body.return_refresh_token.unwrap_or(false),
    ))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    headers: HeaderMap,
    body: Option<Json<RefreshBody>>,
) -> Result<Response, ApiError> {
    if !csrf::verify(&headers, &state.security) {
        return Err(ApiError::Forbidden);
    }
    throttle(&client, "refresh", 60)?;

    let presented = presented_refresh_secret(&state, &headers, body)
        .ok_or(ApiError::RefreshTokenRequired)?;

    match state.rotation.rotate(&presented, &client).await {
        Ok(rotated) => {
            state
                .audit
                .record(AuditEvent::new("auth.refresh", client).user(rotated.record.user_id))
                .await;

            let mut res = Json(json!({ "ok": true, "accessToken": rotated.access_token }))
                .into_response();
            cookies::set_signed(
                res.headers_mut(),
                &state.security,
                &state.security.refresh_cookie_name,
                &rotated.refresh_secret,
                Some(state.config.refresh_ttl),
            );
            Ok(res)
        }
        Err(err) => {
            let err = ApiError::from(err);
            // Credential failures take the dead cookie with them; transient
            // store trouble must not log the client out.
            if err.status() == StatusCode::UNAUTHORIZED {
                Ok(cleared_refresh_response(&state, err))
            } else {
                Err(err)
            }
        }
    }
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    headers: HeaderMap,
    body: Option<Json<RefreshBody>>,
) -> Result<Response, ApiError> {
    if !csrf::verify(&headers, &state.security) {
        return Err(ApiError::Forbidden);
    }

    let mut user_id = None;
    if let Some(presented) = presented_refresh_secret(&state, &headers, body) {
        let token_hash = secret::digest(&presented);
        if let Some(record) = state.store.refresh_by_hash(&token_hash).await? {
            user_id = Some(record.user_id);
            if record.revoked_at.is_none() {
                state.store.revoke_refresh(record.id).await?;
            }
        }
    }

    let mut event = AuditEvent::new("auth.logout", client);
    if let Some(user_id) = user_id {
        event = event.user(user_id);
    }
    state.audit.record(event).await;

    let mut res = Json(json!({ "ok": true })).into_response();
    cookies::clear(
        res.headers_mut(),
        &state.security,
        &state.security.refresh_cookie_name,
    );
    Ok(res)
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let current_digest = current_cookie_digest(&state, &headers);
    let sessions = state
        .registry
        .list_active(user.id, current_digest.as_deref())
        .await?;
    Ok(Json(json!({ "ok": true, "sessions": sessions })))
}

pub async fn revoke_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    client: ClientInfo,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record_id = Uuid::parse_str(&id).map_err(|_| ApiError::NotFound)?;
    let current_digest = current_cookie_digest(&state, &headers);

    state
        .registry
        .revoke_one(user.id, record_id, current_digest.as_deref())
        .await?;

    state
        .audit
        .record(
            AuditEvent::new("auth.session.revoke", client)
                .user(user.id)
                .entity("RefreshToken", record_id.to_string()),
        )
        .await;

    Ok(Json(json!({ "ok": true })))
}

pub async fn revoke_other_sessions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    client: ClientInfo,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let current_digest = current_cookie_digest(&state, &headers);
    let revoked = state
        .registry
        .revoke_all_except_current(user.id, current_digest.as_deref())
        .await?;

    state
        .audit
        .record(
            AuditEvent::new("auth.session.revoke_all_others", client)
                .user(user.id)
                .meta(json!({ "revokedCount": revoked })),
        )
        .await;

    Ok(Json(json!({ "ok": true, "revoked": revoked })))
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let well_formed = email.contains('@') && email.len() <= 255 && !email.starts_with('@');
    if !well_formed {
        return Err(ApiError::Validation("invalid email".into()));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 || password.len() > 72 {
        return Err(ApiError::Validation(
            "password must be 8-72 characters".into(),
        ));
    }
    Ok(())
}

fn throttle(client: &ClientInfo, scope: &str, limit: u32) -> Result<(), ApiError> {
    if let Some(ip) = &client.ip {
        if !rate_limit::check(&format!("{scope}:{ip}"), limit, 60) {
            return Err(ApiError::RateLimited);
        }
    }
    Ok(())
}

/// Body value wins over the cookie, mirroring how clients without cookie
/// storage use the API.
fn presented_refresh_secret(
    state: &AppState,
    headers: &HeaderMap,
    body: Option<Json<RefreshBody>>,
) -> Option<String> {
    body.and_then(|Json(body)| body.refresh_token)
        .filter(|token| !token.is_empty())
        .or_else(|| {
            cookies::read_signed(
                headers,
                &state.security.cookie_key,
                &state.security.refresh_cookie_name,
            )
        })
}

fn current_cookie_digest(state: &AppState, headers: &HeaderMap) -> Option<String> {
    cookies::read_signed(
        headers,
        &state.security.cookie_key,
        &state.security.refresh_cookie_name,
    )
    .map(|raw| secret::digest(&raw))
}

fn tokens_response(state: &AppState, tokens: IssuedTokens, return_refresh_token: bool) -> Response {
    let body = LoginResponse {
        ok: true,
        access_token: tokens.access_token,
        refresh_token: return_refresh_token.then(|| tokens.refresh_secret.clone()),
    };
    let mut res = Json(body).into_response();
    cookies::set_signed(
        res.headers_mut(),
        &state.security,
        &state.security.refresh_cookie_name,
        &tokens.refresh_secret,
        Some(state.config.refresh_ttl),
    );
    res
}

fn cleared_refresh_response(state: &AppState, err: ApiError) -> Response {
    let mut res = err.into_response();
    cookies::clear(
        res.headers_mut(),
        &state.security,
        &state.security.refresh_cookie_name,
    );
    res
}
