use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

/// Claims carried by the access credential. Verified by signature and expiry
/// alone; there is no server-side state behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("token error: {0}")]
    Token(String),
}

#[derive(Clone)]
pub struct JwtManager {
    secret: String,
    ttl: Duration,
}

impl JwtManager {
    pub fn new(secret: String, ttl: Duration) -> Self {
        JwtManager { secret, ttl }
    }

    pub fn issue_access(&self, subject: &str, email: &str) -> Result<String, JwtError> {
        self.issue_with_ttl(subject, email, self.ttl)
    }

    fn issue_with_ttl(&self, subject: &str, email: &str, ttl: Duration) -> Result<String, JwtError> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: subject.to_string(),
            email: email.to_string(),
            exp: (now + ttl).unix_timestamp(),
            iat: now.unix_timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| JwtError::Token(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| JwtError::Token(e.to_string()))?;
        Ok(data.claims)
    }
}
