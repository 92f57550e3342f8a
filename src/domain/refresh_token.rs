use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// One link in a rotation chain. Rows are never deleted, only revoked;
/// `replaced_by_id` is set exactly when the revocation came from rotation.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub revoked_at: Option<OffsetDateTime>,
    pub replaced_by_id: Option<Uuid>,
    pub created_ip: Option<String>,
    pub created_user_agent: Option<String>,
    pub last_used_at: Option<OffsetDateTime>,
    pub last_used_ip: Option<String>,
    pub last_used_user_agent: Option<String>,
}

impl RefreshRecord {
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// What a user gets to see about one of their sessions. Carries provenance
/// metadata only; the token digest never leaves the store layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub created_ip: Option<String>,
    pub created_user_agent: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_used_at: Option<OffsetDateTime>,
    pub last_used_ip: Option<String>,
    pub last_used_user_agent: Option<String>,
    pub is_current: bool,
}

impl SessionView {
    pub fn from_record(record: RefreshRecord, is_current: bool) -> Self {
        SessionView {
            id: record.id,
            created_at: record.created_at,
            expires_at: record.expires_at,
            created_ip: record.created_ip,
            created_user_agent: record.created_user_agent,
            last_used_at: record.last_used_at,
            last_used_ip: record.last_used_ip,
            last_used_user_agent: record.last_used_user_agent,
            is_current,
        }
    }
}
