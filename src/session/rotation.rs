use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::warn;

use crate::domain::{ClientInfo, RefreshRecord};
use crate::infra::audit::{AuditEvent, AuditSink};
use crate::security::jwt::{JwtError, JwtManager};
use crate::security::secret;
use crate::store::{CredentialStore, NewRefreshRecord, RotateOutcome, StoreError};

/// Per-call outcome of presenting a refresh secret. A record is either still
/// rotatable or terminally revoked; there is no partial state in between.
#[derive(Debug, Error)]
pub enum RotationError {
    /// No record matches the presented secret's digest.
    #[error("unknown refresh token")]
    InvalidToken,
    /// The record was already revoked: someone is replaying an old secret.
    /// Every active session of the owning user has been revoked.
    #[error("refresh token reuse detected")]
    ReuseDetected,
    /// Unrevoked but past its expiry. Stale, not stolen; nothing else is
    /// touched.
    #[error("refresh token expired")]
    Expired,
    /// A competing call rotated the same record first. The presented secret
    /// is dead but the account is untouched.
    #[error("lost rotation race")]
    ConcurrentRotation,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
}

#[derive(Debug)]
pub struct RotatedTokens {
    pub access_token: String,
    pub refresh_secret: String,
    pub record: RefreshRecord,
}

pub struct RotationEngine {
    store: Arc<dyn CredentialStore>,
    jwt: JwtManager,
    audit: Arc<dyn AuditSink>,
    refresh_ttl: Duration,
}

impl RotationEngine {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        jwt: JwtManager,
        audit: Arc<dyn AuditSink>,
        refresh_ttl: Duration,
    ) -> Self {
        RotationEngine {
            store,
            jwt,
            audit,
            refresh_ttl,
        }
    }

    /// Exchange a live refresh secret for a fresh access/refresh pair,
    /// invalidating the presented one.
    ///
    /// Presenting an already-revoked secret is treated as theft: every
    /// active record of that user is revoked in one conditional sweep and
    /// the incident is reported to the audit sink. Two truly simultaneous
    /// calls with the same secret cannot both win — the store's conditional
    /// claim picks one winner and the loser comes back as
    /// `ConcurrentRotation`, which does not cascade.
    pub async fn rotate(
        &self,
        presented_secret: &str,
        client: &ClientInfo,
    ) -> Result<RotatedTokens, RotationError> {
        let token_hash = secret::digest(presented_secret);
        let record = self
            .store
            .refresh_by_hash(&token_hash)
            .await?
            .ok_or(RotationError::InvalidToken)?;

        if record.revoked_at.is_some() {
            return Err(self.handle_reuse(&record, client).await?);
        }

        let now = OffsetDateTime::now_utc();
        if record.expires_at <= now {
            return Err(RotationError::Expired);
        }

        let refresh_secret = secret::generate();
        let successor = NewRefreshRecord {
            user_id: record.user_id,
            token_hash: secret::digest(&refresh_secret),
            expires_at: now + self.refresh_ttl,
            client: client.clone(),
        };

        let successor = match self.store.rotate_refresh(record.id, successor).await? {
            RotateOutcome::Rotated(successor) => successor,
            RotateOutcome::Lost => return Err(RotationError::ConcurrentRotation),
        };

        let identity = self
            .store
            .identity_by_id(record.user_id)
            .await?
            .ok_or(RotationError::InvalidToken)?;
        let access_token = self
            .jwt
            .issue_access(&identity.id.to_string(), &identity.email)?;

        Ok(RotatedTokens {
            access_token,
            refresh_secret,
            record: successor,
        })
    }

    async fn handle_reuse(
        &self,
        record: &RefreshRecord,
        client: &ClientInfo,
    ) -> Result<RotationError, StoreError> {
        let revoked = self.store.revoke_all_for_user(record.user_id, None).await?;
        warn!(
            user_id = %record.user_id,
            refresh_token_id = %record.id,
            revoked,
            "refresh token reuse detected; revoked all active sessions"
        );
        self.audit
            .record(
                AuditEvent::new("auth.refresh.reuse_detected", client.clone())
                    .user(record.user_id)
                    .entity("RefreshToken", record.id.to_string())
                    .meta(json!({
                        "reason": "refresh token presented after revocation",
                        "revokedSessions": revoked,
                    })),
            )
            .await;
        Ok(RotationError::ReuseDetected)
    }
}
