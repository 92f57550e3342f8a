use cookie::{Key, SameSite};
use sha2::{Digest, Sha512};
use tracing::warn;

/// Cookie surface configuration. The signing key is derived from
/// `COOKIE_SECRET`; refresh and CSRF cookies are both signed with it.
#[derive(Clone)]
pub struct SecurityConfig {
    pub refresh_cookie_name: String,
    pub csrf_cookie_name: String,
    pub secure_cookies: bool,
    pub same_site: SameSite,
    pub cookie_key: Key,
}

impl SecurityConfig {
    pub fn from_env() -> Self {
        let refresh_cookie_name =
            env_string("REFRESH_COOKIE_NAME").unwrap_or_else(|| "gk_refresh".into());
        let csrf_cookie_name =
            env_string("CSRF_COOKIE_NAME").unwrap_or_else(|| "gk_csrf".into());
        let cookie_secret =
            env_string("COOKIE_SECRET").unwrap_or_else(|| "dev-cookie-secret-change-me".into());

        let mut secure_cookies = env_bool("COOKIE_SECURE").unwrap_or(false);
        let same_site = env_same_site().unwrap_or(SameSite::Lax);

        if same_site == SameSite::None && !secure_cookies {
            warn!("SameSite=None requires secure cookies; forcing COOKIE_SECURE=true");
            secure_cookies = true;
        }

        SecurityConfig {
            refresh_cookie_name,
            csrf_cookie_name,
            secure_cookies,
            same_site,
            cookie_key: derive_key(&cookie_secret),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Stretch an arbitrary-length secret into the 64 bytes the cookie jar wants.
pub fn derive_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().and_then(|v| {
        match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    })
}

fn env_same_site() -> Option<SameSite> {
    std::env::var("COOKIE_SAMESITE").ok().and_then(|v| {
        match v.trim().to_ascii_lowercase().as_str() {
            "none" => Some(SameSite::None),
            "lax" => Some(SameSite::Lax),
            "strict" => Some(SameSite::Strict),
            _ => None,
        }
    })
}
