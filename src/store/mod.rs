//! Persistence seam for identities and refresh records.
//!
//! Every operation receives the store as an explicit handle so the service
//! layer never touches a process-wide connection, and tests can swap in the
//! in-memory implementation. All multi-row mutations are conditional: the
//! store promises that callers never observe a half-applied rotation.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{ClientInfo, Identity, RefreshRecord};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("unique constraint violated")]
    Conflict,
}

/// Fields of a refresh record about to be written. The store assigns the id
/// and stamps `created_at`/`last_used_*` from `client` at insert time.
#[derive(Debug, Clone)]
pub struct NewRefreshRecord {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
    pub client: ClientInfo,
}

impl NewRefreshRecord {
    /// Provenance lands in both `created_*` and `last_used_*` of the fresh
    /// record.
    fn into_record(self, now: OffsetDateTime) -> RefreshRecord {
        RefreshRecord {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            token_hash: self.token_hash,
            created_at: now,
            expires_at: self.expires_at,
            revoked_at: None,
            replaced_by_id: None,
            created_ip: self.client.ip.clone(),
            created_user_agent: self.client.user_agent.clone(),
            last_used_at: Some(now),
            last_used_ip: self.client.ip,
            last_used_user_agent: self.client.user_agent,
        }
    }
}

/// Result of trying to advance a rotation chain.
#[derive(Debug)]
pub enum RotateOutcome {
    Rotated(RefreshRecord),
    /// A competing call revoked the predecessor before our claim landed.
    /// Nothing was written.
    Lost,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert an identity. `StoreError::Conflict` when the email is taken.
    async fn create_identity(
        &self,
        email: &str,
        password_digest: Option<String>,
    ) -> Result<Identity, StoreError>;

    async fn identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    async fn identity_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError>;

    async fn insert_refresh(&self, record: NewRefreshRecord) -> Result<RefreshRecord, StoreError>;

    async fn refresh_by_hash(&self, token_hash: &str) -> Result<Option<RefreshRecord>, StoreError>;

    /// Record by id, scoped to its owner. Returns revoked and expired records
    /// too; callers decide what the state means.
    async fn refresh_by_id(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<RefreshRecord>, StoreError>;

    /// Atomically: insert the successor, stamp the predecessor's `last_used_*`
    /// from the successor's provenance, and set its `revoked_at` and
    /// `replaced_by_id` — all guarded by `revoked_at` still being unset.
    /// Exactly one of two concurrent callers can win; the loser gets
    /// [`RotateOutcome::Lost`] and no residue.
    async fn rotate_refresh(
        &self,
        predecessor_id: Uuid,
        successor: NewRefreshRecord,
    ) -> Result<RotateOutcome, StoreError>;

    /// Conditional, idempotent revocation. Returns whether this call was the
    /// one that revoked the record.
    async fn revoke_refresh(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Bulk-revoke every active record of a user, optionally sparing the one
    /// whose digest matches `except_hash`. Returns the number revoked.
    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        except_hash: Option<&str>,
    ) -> Result<u64, StoreError>;

    /// Active (unrevoked, unexpired) records, newest first.
    async fn list_active_for_user(&self, user_id: Uuid)
        -> Result<Vec<RefreshRecord>, StoreError>;
}
