use time::Duration;

/// Service configuration, loaded from the environment with dev-friendly
/// defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Lets unknown or passwordless accounts log in without a password.
    pub allow_dev_login: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_env("PORT", 4000)?;
        let jwt_secret =
            std::env::var("JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".to_string());
        let access_ttl = Duration::seconds(parse_env("ACCESS_TOKEN_TTL_SECS", 900)?);
        let refresh_ttl = Duration::days(parse_env("REFRESH_TOKEN_TTL_DAYS", 30)?);
        let allow_dev_login = parse_env("ALLOW_DEV_LOGIN", true)?;

        Ok(AppConfig {
            host,
            port,
            jwt_secret,
            access_ttl,
            refresh_ttl,
            allow_dev_login,
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {}: {}", name, e)),
        Err(_) => Ok(default),
    }
}
