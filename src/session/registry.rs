use std::sync::Arc;

use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::SessionView;
use crate::store::{CredentialStore, StoreError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    /// Revoking the session backing the current request goes through logout,
    /// not this path.
    #[error("cannot revoke current session")]
    CannotRevokeCurrent,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Read-side views and explicit revocation over a user's refresh records.
pub struct SessionRegistry {
    store: Arc<dyn CredentialStore>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        SessionRegistry { store }
    }

    /// Active sessions, newest first. `current_digest` is the digest of the
    /// caller's presented refresh cookie, if any; it only drives the
    /// `is_current` flag.
    pub async fn list_active(
        &self,
        user_id: Uuid,
        current_digest: Option<&str>,
    ) -> Result<Vec<SessionView>, SessionError> {
        let records = self.store.list_active_for_user(user_id).await?;
        Ok(records
            .into_iter()
            .map(|record| {
                let is_current =
                    current_digest.is_some_and(|digest| digests_match(digest, &record.token_hash));
                SessionView::from_record(record, is_current)
            })
            .collect())
    }

    /// Revoke one session by id. Idempotent for already-revoked records.
    pub async fn revoke_one(
        &self,
        user_id: Uuid,
        record_id: Uuid,
        current_digest: Option<&str>,
    ) -> Result<(), SessionError> {
        let record = self
            .store
            .refresh_by_id(user_id, record_id)
            .await?
            .ok_or(SessionError::NotFound)?;

        if current_digest.is_some_and(|digest| digests_match(digest, &record.token_hash)) {
            return Err(SessionError::CannotRevokeCurrent);
        }

        self.store.revoke_refresh(record.id).await?;
        Ok(())
    }

    /// "Sign out everywhere else." Returns how many sessions were revoked.
    pub async fn revoke_all_except_current(
        &self,
        user_id: Uuid,
        current_digest: Option<&str>,
    ) -> Result<u64, SessionError> {
        Ok(self
            .store
            .revoke_all_for_user(user_id, current_digest)
            .await?)
    }

    /// "Sign out everywhere", also used by the reuse cascade.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, SessionError> {
        Ok(self.store.revoke_all_for_user(user_id, None).await?)
    }
}

fn digests_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
