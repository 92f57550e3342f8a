//! Double-submit CSRF guard for the cookie-authenticated endpoints.
//!
//! The token travels twice: once in a signed cookie, once echoed back by the
//! client in the `x-csrf-token` header. A cross-site request can trigger the
//! cookie but cannot read it to fill the header.

use axum::http::HeaderMap;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;

use super::config::SecurityConfig;
use super::cookies;

pub const CSRF_HEADER: &str = "x-csrf-token";

pub fn issue_token() -> String {
    let mut buf = [0u8; 32];
    OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

pub fn verify(headers: &HeaderMap, cfg: &SecurityConfig) -> bool {
    let presented = match headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok()) {
        Some(value) if !value.is_empty() => value,
        _ => return false,
    };
    let expected =
        match cookies::read_signed(headers, &cfg.cookie_key, &cfg.csrf_cookie_name) {
            Some(value) => value,
            None => return false,
        };
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}
