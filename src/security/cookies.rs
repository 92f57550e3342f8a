use axum::http::header::{HeaderValue, COOKIE, SET_COOKIE};
use axum::http::HeaderMap;
use cookie::{Cookie, CookieJar, Key};
use time::Duration;

use super::config::SecurityConfig;

/// Every cookie this service sets is scoped to the auth surface.
pub const AUTH_COOKIE_PATH: &str = "/auth";

/// Sign `value` and append the Set-Cookie header. `max_age` of `None` yields
/// a session cookie.
pub fn set_signed(
    headers: &mut HeaderMap,
    cfg: &SecurityConfig,
    name: &str,
    value: &str,
    max_age: Option<Duration>,
) {
    let mut builder = Cookie::build((name.to_string(), value.to_string()))
        .http_only(true)
        .secure(cfg.secure_cookies)
        .same_site(cfg.same_site)
        .path(AUTH_COOKIE_PATH);
    if let Some(age) = max_age {
        builder = builder.max_age(age);
    }

    let mut jar = CookieJar::new();
    jar.signed_mut(&cfg.cookie_key).add(builder.build());
    for cookie in jar.delta() {
        headers.append(SET_COOKIE, header_value(&cookie.to_string()));
    }
}

/// Expire a cookie immediately.
pub fn clear(headers: &mut HeaderMap, cfg: &SecurityConfig, name: &str) {
    let cookie = Cookie::build((name.to_string(), String::new()))
        .http_only(true)
        .secure(cfg.secure_cookies)
        .same_site(cfg.same_site)
        .path(AUTH_COOKIE_PATH)
        .max_age(Duration::seconds(0))
        .build();
    headers.append(SET_COOKIE, header_value(&cookie.to_string()));
}

/// Read a cookie and verify its signature. Tampered or unsigned values
/// return `None`.
pub fn read_signed(headers: &HeaderMap, key: &Key, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let raw = match header.to_str() {
            Ok(raw) => raw,
            Err(_) => continue,
        };
        for part in raw.split(';') {
            let parsed = match Cookie::parse(part.trim().to_string()) {
                Ok(parsed) => parsed,
                Err(_) => continue,
            };
            if parsed.name() != name {
                continue;
            }
            let mut jar = CookieJar::new();
            jar.add_original(parsed);
            if let Some(verified) = jar.signed(key).get(name) {
                return Some(verified.value().to_string());
            }
        }
    }
    None
}

fn header_value(cookie: &str) -> HeaderValue {
    HeaderValue::from_str(cookie).expect("cookie serializes to a valid header value")
}
