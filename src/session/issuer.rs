use std::sync::Arc;

use thiserror::Error;
use time::{Duration, OffsetDateTime};

use crate::domain::{ClientInfo, Identity, RefreshRecord};
use crate::security::jwt::{JwtError, JwtManager};
use crate::security::secret;
use crate::store::{CredentialStore, NewRefreshRecord, StoreError};

#[derive(Debug, Error)]
pub enum IssueError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
}

/// A freshly minted credential pair. `refresh_secret` exists only in this
/// value and in the client's hands; the store keeps its digest.
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_secret: String,
    pub record: RefreshRecord,
}

pub struct TokenIssuer {
    store: Arc<dyn CredentialStore>,
    jwt: JwtManager,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(store: Arc<dyn CredentialStore>, jwt: JwtManager, refresh_ttl: Duration) -> Self {
        TokenIssuer {
            store,
            jwt,
            refresh_ttl,
        }
    }

    /// Mint an access/refresh pair for an authenticated identity and record
    /// the refresh side. Request provenance lands in both the `created_*`
    /// and `last_used_*` fields of the new record.
    pub async fn issue(
        &self,
        identity: &Identity,
        client: &ClientInfo,
    ) -> Result<IssuedTokens, IssueError> {
        let refresh_secret = secret::generate();
        let record = self
            .store
            .insert_refresh(NewRefreshRecord {
                user_id: identity.id,
                token_hash: secret::digest(&refresh_secret),
                expires_at: OffsetDateTime::now_utc() + self.refresh_ttl,
                client: client.clone(),
            })
            .await?;

        let access_token = self
            .jwt
            .issue_access(&identity.id.to_string(), &identity.email)?;

        Ok(IssuedTokens {
            access_token,
            refresh_secret,
            record,
        })
    }
}
