use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use cookie::SameSite;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;

use gatekeeper::config::AppConfig;
use gatekeeper::domain::ClientInfo;
use gatekeeper::infra::audit::{AuditEvent, AuditSink};
use gatekeeper::security::config::{derive_key, SecurityConfig};
use gatekeeper::security::secret;
use gatekeeper::state::AppState;
use gatekeeper::store::{CredentialStore, MemoryStore, NewRefreshRecord};

struct RecordingSink(Mutex<Vec<String>>);

#[async_trait::async_trait]
impl AuditSink for RecordingSink {
    async fn record(&self, event: AuditEvent) {
        self.0.lock().unwrap().push(event.action.to_string());
    }
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Arc::new(RecordingSink(Mutex::new(Vec::new())))
    }

    fn actions(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    audit: Arc<RecordingSink>,
}

fn test_app_with(allow_dev_login: bool) -> TestApp {
    let config = AppConfig {
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: "integration-test-jwt-secret".into(),
        access_ttl: Duration::minutes(15),
        refresh_ttl: Duration::days(30),
        allow_dev_login,
    };
    let security = SecurityConfig {
        refresh_cookie_name: "gk_refresh".into(),
        csrf_cookie_name: "gk_csrf".into(),
        secure_cookies: false,
        same_site: SameSite::Lax,
        cookie_key: derive_key("integration-test-cookie-secret"),
    };
    let store = Arc::new(MemoryStore::new());
    let audit = RecordingSink::new();
    let state = AppState::new(config, security, store.clone(), audit.clone());
    TestApp {
        router: gatekeeper::router(state),
        store,
        audit,
    }
}

fn test_app() -> TestApp {
    test_app_with(true)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
}

/// First `name=value` pair from a Set-Cookie header for `name`.
fn cookie_pair(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get_all(SET_COOKIE).iter().find_map(|header| {
        let raw = header.to_str().ok()?;
        let pair = raw.split(';').next()?.trim();
        pair.starts_with(&format!("{name}=")).then(|| pair.to_string())
    })
}

async fn register(app: &TestApp, email: &str, password: &str) -> (StatusCode, Value) {
    let (status, _, body) = send(
        &app.router,
        json_request(
            "POST",
            "/auth/register",
            json!({ "email": email, "password": password }),
        ),
    )
    .await;
    (status, body)
}

struct LoginResult {
    access_token: String,
    refresh_secret: String,
    refresh_cookie: String,
}

async fn login(app: &TestApp, email: &str, password: &str) -> LoginResult {
    let (status, headers, body) = send(
        &app.router,
        json_request(
            "POST",
            "/auth/login",
            json!({ "email": email, "password": password, "returnRefreshToken": true }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    LoginResult {
        access_token: body["accessToken"].as_str().unwrap().to_string(),
        refresh_secret: body["refreshToken"].as_str().unwrap().to_string(),
        refresh_cookie: cookie_pair(&headers, "gk_refresh").unwrap(),
    }
}

struct CsrfResult {
    token: String,
    cookie: String,
}

async fn fetch_csrf(app: &TestApp) -> CsrfResult {
    let (status, headers, body) = send(
        &app.router,
        Request::builder()
            .uri("/auth/csrf")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    CsrfResult {
        token: body["csrfToken"].as_str().unwrap().to_string(),
        cookie: cookie_pair(&headers, "gk_csrf").unwrap(),
    }
}

fn refresh_request(cookies: &[&str], csrf_token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/auth/refresh");
    if !cookies.is_empty() {
        builder = builder.header(COOKIE, cookies.join("; "));
    }
    if let Some(token) = csrf_token {
        builder = builder.header("x-csrf-token", token);
    }
    match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn register_login_rotate_then_reuse_cascades() {
    let app = test_app();

    let (status, body) = register(&app, "a@x.com", "pw12345678").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["user"]["email"], json!("a@x.com"));

    let session = login(&app, "a@x.com", "pw12345678").await;
    let csrf = fetch_csrf(&app).await;

    // Rotate: old secret dies, a linked successor takes over.
    let (status, headers, body) = send(
        &app.router,
        refresh_request(
            &[session.refresh_cookie.as_str(), csrf.cookie.as_str()],
            Some(csrf.token.as_str()),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["accessToken"].as_str().is_some());
    let rotated_cookie = cookie_pair(&headers, "gk_refresh").unwrap();
    assert_ne!(rotated_cookie, session.refresh_cookie);

    let predecessor = app
        .store
        .refresh_by_hash(&secret::digest(&session.refresh_secret))
        .await
        .unwrap()
        .unwrap();
    assert!(predecessor.revoked_at.is_some());
    let successor_id = predecessor.replaced_by_id.unwrap();
    let successor = app
        .store
        .refresh_by_id(predecessor.user_id, successor_id)
        .await
        .unwrap()
        .unwrap();
    assert!(successor.revoked_at.is_none());
    assert_ne!(successor.token_hash, predecessor.token_hash);

    // Replay the dead predecessor: reuse detected, every session revoked.
    let (status, _, body) = send(
        &app.router,
        refresh_request(
            &[session.refresh_cookie.as_str(), csrf.cookie.as_str()],
            Some(csrf.token.as_str()),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("REFRESH_TOKEN_REUSE_DETECTED"));

    let active = app
        .store
        .list_active_for_user(predecessor.user_id)
        .await
        .unwrap();
    assert!(active.is_empty());
    assert!(app
        .audit
        .actions()
        .contains(&"auth.refresh.reuse_detected".to_string()));
}

#[tokio::test]
async fn refresh_requires_csrf_and_a_token() {
    let app = test_app();
    register(&app, "a@x.com", "pw12345678").await;
    let session = login(&app, "a@x.com", "pw12345678").await;

    // No CSRF token at all.
    let (status, _, body) = send(
        &app.router,
        refresh_request(&[session.refresh_cookie.as_str()], None, None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], json!("FORBIDDEN"));

    // CSRF passes but no refresh token anywhere.
    let csrf = fetch_csrf(&app).await;
    let (status, _, body) = send(
        &app.router,
        refresh_request(&[csrf.cookie.as_str()], Some(csrf.token.as_str()), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("REFRESH_TOKEN_REQUIRED"));
}

#[tokio::test]
async fn expired_token_fails_without_touching_other_sessions() {
    let app = test_app();
    let identity = app.store.create_identity("a@x.com", None).await.unwrap();

    let stale_secret = secret::generate();
    app.store
        .insert_refresh(NewRefreshRecord {
            user_id: identity.id,
            token_hash: secret::digest(&stale_secret),
            expires_at: OffsetDateTime::now_utc() - Duration::hours(1),
            client: ClientInfo::default(),
        })
        .await
        .unwrap();
    let healthy_secret = secret::generate();
    app.store
        .insert_refresh(NewRefreshRecord {
            user_id: identity.id,
            token_hash: secret::digest(&healthy_secret),
            expires_at: OffsetDateTime::now_utc() + Duration::days(30),
            client: ClientInfo::default(),
        })
        .await
        .unwrap();

    let csrf = fetch_csrf(&app).await;
    let (status, _, body) = send(
        &app.router,
        refresh_request(
            &[csrf.cookie.as_str()],
            Some(csrf.token.as_str()),
            Some(json!({ "refreshToken": stale_secret })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("REFRESH_TOKEN_EXPIRED"));

    // No cascade: the stale record stays merely expired, the healthy one lives.
    let stale = app
        .store
        .refresh_by_hash(&secret::digest(&stale_secret))
        .await
        .unwrap()
        .unwrap();
    assert!(stale.revoked_at.is_none());
    assert_eq!(
        app.store.list_active_for_user(identity.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn session_listing_marks_current_and_protects_it() {
    let app = test_app();
    register(&app, "a@x.com", "pw12345678").await;
    let _first = login(&app, "a@x.com", "pw12345678").await;
    let second = login(&app, "a@x.com", "pw12345678").await;

    let list = Request::builder()
        .uri("/auth/sessions")
        .header(AUTHORIZATION, format!("Bearer {}", second.access_token))
        .header(COOKIE, second.refresh_cookie.as_str())
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app.router, list).await;
    assert_eq!(status, StatusCode::OK);

    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    let current: Vec<&Value> = sessions.iter().filter(|s| s["isCurrent"] == json!(true)).collect();
    assert_eq!(current.len(), 1);
    for session in sessions {
        let keys: Vec<&String> = session.as_object().unwrap().keys().collect();
        assert!(!keys.iter().any(|k| k.contains("token") || k.contains("hash") || k.contains("secret")));
    }

    // Revoking the current session through this path is refused.
    let current_id = current[0]["id"].as_str().unwrap();
    let revoke_current = Request::builder()
        .method("DELETE")
        .uri(format!("/auth/sessions/{current_id}"))
        .header(AUTHORIZATION, format!("Bearer {}", second.access_token))
        .header(COOKIE, second.refresh_cookie.as_str())
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app.router, revoke_current).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("CANNOT_REVOKE_CURRENT_SESSION"));

    // The other session can be revoked, and disappears from the listing.
    let other_id = sessions
        .iter()
        .find(|s| s["isCurrent"] == json!(false))
        .unwrap()["id"]
        .as_str()
        .unwrap();
    let revoke_other = Request::builder()
        .method("DELETE")
        .uri(format!("/auth/sessions/{other_id}"))
        .header(AUTHORIZATION, format!("Bearer {}", second.access_token))
        .header(COOKIE, second.refresh_cookie.as_str())
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app.router, revoke_other).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));

    let list = Request::builder()
        .uri("/auth/sessions")
        .header(AUTHORIZATION, format!("Bearer {}", second.access_token))
        .header(COOKIE, second.refresh_cookie.as_str())
        .body(Body::empty())
        .unwrap();
    let (_, _, body) = send(&app.router, list).await;
    assert_eq!(body["sessions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn revoke_all_other_sessions_leaves_only_the_current() {
    let app = test_app();
    register(&app, "a@x.com", "pw12345678").await;
    login(&app, "a@x.com", "pw12345678").await;
    login(&app, "a@x.com", "pw12345678").await;
    let third = login(&app, "a@x.com", "pw12345678").await;

    let revoke_all = Request::builder()
        .method("DELETE")
        .uri("/auth/sessions")
        .header(AUTHORIZATION, format!("Bearer {}", third.access_token))
        .header(COOKIE, third.refresh_cookie.as_str())
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app.router, revoke_all).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], json!(2));

    let list = Request::builder()
        .uri("/auth/sessions")
        .header(AUTHORIZATION, format!("Bearer {}", third.access_token))
        .header(COOKIE, third.refresh_cookie.as_str())
        .body(Body::empty())
        .unwrap();
    let (_, _, body) = send(&app.router, list).await;
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["isCurrent"], json!(true));
}

#[tokio::test]
async fn sessions_require_a_bearer_token() {
    let app = test_app();
    let (status, _, body) = send(
        &app.router,
        Request::builder()
            .uri("/auth/sessions")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("UNAUTHORIZED"));
}

#[tokio::test]
async fn credential_and_validation_failures() {
    let app = test_app_with(false);
    register(&app, "a@x.com", "pw12345678").await;

    // Duplicate registration.
    let (status, body) = register(&app, "a@x.com", "pw12345678").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], json!("EMAIL_ALREADY_EXISTS"));

    // Wrong password.
    let (status, _, body) = send(
        &app.router,
        json_request(
            "POST",
            "/auth/login",
            json!({ "email": "a@x.com", "password": "wrong-password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("INVALID_CREDENTIALS"));

    // Password account, no password supplied.
    let (status, _, body) = send(
        &app.router,
        json_request("POST", "/auth/login", json!({ "email": "a@x.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("PASSWORD_REQUIRED"));

    // Unknown account with dev login disabled.
    let (status, _, body) = send(
        &app.router,
        json_request("POST", "/auth/login", json!({ "email": "b@x.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("INVALID_CREDENTIALS"));

    // Malformed input is rejected before any store access.
    let (status, body) = register(&app, "not-an-email", "pw12345678").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("VALIDATION_ERROR"));
    let (status, body) = register(&app, "c@x.com", "short").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("VALIDATION_ERROR"));
    assert!(app
        .store
        .identity_by_email("c@x.com")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn dev_login_creates_a_passwordless_identity() {
    let app = test_app();

    let (status, _, body) = send(
        &app.router,
        json_request("POST", "/auth/login", json!({ "email": "dev@x.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["accessToken"].as_str().is_some());

    let identity = app
        .store
        .identity_by_email("dev@x.com")
        .await
        .unwrap()
        .unwrap();
    assert!(identity.password_digest.is_none());
    assert_eq!(
        app.store.list_active_for_user(identity.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn logout_revokes_the_presented_session_and_clears_the_cookie() {
    let app = test_app();
    register(&app, "a@x.com", "pw12345678").await;
    let session = login(&app, "a@x.com", "pw12345678").await;
    let csrf = fetch_csrf(&app).await;

    let logout = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .header(COOKIE, format!("{}; {}", session.refresh_cookie, csrf.cookie))
        .header("x-csrf-token", csrf.token.as_str())
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&app.router, logout).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));

    let cleared = headers
        .get_all(SET_COOKIE)
        .iter()
        .any(|h| {
            let raw = h.to_str().unwrap();
            raw.starts_with("gk_refresh=") && raw.contains("Max-Age=0")
        });
    assert!(cleared);

    let record = app
        .store
        .refresh_by_hash(&secret::digest(&session.refresh_secret))
        .await
        .unwrap()
        .unwrap();
    assert!(record.revoked_at.is_some());
    assert!(record.replaced_by_id.is_none());
    assert!(app.audit.actions().contains(&"auth.logout".to_string()));
}
