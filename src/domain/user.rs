use time::OffsetDateTime;
use uuid::Uuid;

/// An account as the session subsystem sees it. `password_digest` is `None`
/// for passwordless (dev-login) accounts, which changes issuance branching
/// but nothing else.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub password_digest: Option<String>,
    pub created_at: OffsetDateTime,
}

impl Identity {
    pub fn is_passwordless(&self) -> bool {
        self.password_digest.is_none()
    }
}
