use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{Identity, RefreshRecord};

use super::{CredentialStore, NewRefreshRecord, RotateOutcome, StoreError};

/// Mutex-guarded store with the same conditional-write semantics as the
/// Postgres implementation. Used by tests for per-test isolation.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    identities: HashMap<Uuid, Identity>,
    records: HashMap<Uuid, RefreshRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn create_identity(
        &self,
        email: &str,
        password_digest: Option<String>,
    ) -> Result<Identity, StoreError> {
        let mut inner = self.lock()?;
        if inner.identities.values().any(|u| u.email == email) {
            return Err(StoreError::Conflict);
        }
        let identity = Identity {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_digest,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.identities.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.identities.values().find(|u| u.email == email).cloned())
    }

    async fn identity_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.identities.get(&id).cloned())
    }

    async fn insert_refresh(&self, record: NewRefreshRecord) -> Result<RefreshRecord, StoreError> {
        let mut inner = self.lock()?;
        if inner
            .records
            .values()
            .any(|r| r.token_hash == record.token_hash)
        {
            return Err(StoreError::Conflict);
        }
        let record = record.into_record(OffsetDateTime::now_utc());
        inner.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn refresh_by_hash(&self, token_hash: &str) -> Result<Option<RefreshRecord>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .records
            .values()
            .find(|r| r.token_hash == token_hash)
            .cloned())
    }

    async fn refresh_by_id(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<RefreshRecord>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .records
            .get(&id)
            .filter(|r| r.user_id == user_id)
            .cloned())
    }

    async fn rotate_refresh(
        &self,
        predecessor_id: Uuid,
        successor: NewRefreshRecord,
    ) -> Result<RotateOutcome, StoreError> {
        let mut inner = self.lock()?;
        let now = OffsetDateTime::now_utc();

        match inner.records.get(&predecessor_id) {
            Some(predecessor) if predecessor.revoked_at.is_none() => {}
            Some(_) => return Ok(RotateOutcome::Lost),
            None => return Ok(RotateOutcome::Lost),
        }

        let record = successor.into_record(now);
        inner.records.insert(record.id, record.clone());

        if let Some(predecessor) = inner.records.get_mut(&predecessor_id) {
            predecessor.revoked_at = Some(now);
            predecessor.replaced_by_id = Some(record.id);
            predecessor.last_used_at = Some(now);
            predecessor.last_used_ip = record.created_ip.clone();
            predecessor.last_used_user_agent = record.created_user_agent.clone();
        }

        Ok(RotateOutcome::Rotated(record))
    }

    async fn revoke_refresh(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        match inner.records.get_mut(&id) {
            Some(record) if record.revoked_at.is_none() => {
                record.revoked_at = Some(OffsetDateTime::now_utc());
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        except_hash: Option<&str>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.lock()?;
        let now = OffsetDateTime::now_utc();
        let mut revoked = 0;
        for record in inner.records.values_mut() {
            if record.user_id != user_id || record.revoked_at.is_some() {
                continue;
            }
            if except_hash.is_some_and(|hash| record.token_hash == hash) {
                continue;
            }
            record.revoked_at = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn list_active_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshRecord>, StoreError> {
        let inner = self.lock()?;
        let now = OffsetDateTime::now_utc();
        let mut active: Vec<RefreshRecord> = inner
            .records
            .values()
            .filter(|r| r.user_id == user_id && r.is_active(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }
}
