use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{Identity, RefreshRecord};

use super::{CredentialStore, NewRefreshRecord, RotateOutcome, StoreError};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

const INSERT_REFRESH: &str = "INSERT INTO refresh_tokens \
     (id, user_id, token_hash, created_at, expires_at, revoked_at, replaced_by_id, \
      created_ip, created_user_agent, last_used_at, last_used_ip, last_used_user_agent) \
     VALUES ($1, $2, $3, $4, $5, NULL, NULL, $6, $7, $8, $9, $10)";

fn io_error(err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.constraint().is_some() {
            return StoreError::Conflict;
        }
    }
    io_error(err)
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn create_identity(
        &self,
        email: &str,
        password_digest: Option<String>,
    ) -> Result<Identity, StoreError> {
        let identity = Identity {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_digest,
            created_at: OffsetDateTime::now_utc(),
        };
        sqlx::query(
            "INSERT INTO users (id, email, password_digest, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(identity.id)
        .bind(&identity.email)
        .bind(&identity.password_digest)
        .bind(identity.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(identity)
    }

    async fn identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        sqlx::query_as::<_, Identity>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(io_error)
    }

    async fn identity_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        sqlx::query_as::<_, Identity>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(io_error)
    }

    async fn insert_refresh(&self, record: NewRefreshRecord) -> Result<RefreshRecord, StoreError> {
        let record = record.into_record(OffsetDateTime::now_utc());
        sqlx::query(INSERT_REFRESH)
            .bind(record.id)
            .bind(record.user_id)
            .bind(&record.token_hash)
            .bind(record.created_at)
            .bind(record.expires_at)
            .bind(&record.created_ip)
            .bind(&record.created_user_agent)
            .bind(record.last_used_at)
            .bind(&record.last_used_ip)
            .bind(&record.last_used_user_agent)
            .execute(&self.pool)
            .await
            .map_err(write_error)?;
        Ok(record)
    }

    async fn refresh_by_hash(&self, token_hash: &str) -> Result<Option<RefreshRecord>, StoreError> {
        sqlx::query_as::<_, RefreshRecord>("SELECT * FROM refresh_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(io_error)
    }

    async fn refresh_by_id(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<RefreshRecord>, StoreError> {
        sqlx::query_as::<_, RefreshRecord>(
            "SELECT * FROM refresh_tokens WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(io_error)
    }

    async fn rotate_refresh(
        &self,
        predecessor_id: Uuid,
        successor: NewRefreshRecord,
    ) -> Result<RotateOutcome, StoreError> {
        let now = OffsetDateTime::now_utc();
        let record = successor.into_record(now);

        let mut tx = self.pool.begin().await.map_err(io_error)?;

        sqlx::query(INSERT_REFRESH)
            .bind(record.id)
            .bind(record.user_id)
            .bind(&record.token_hash)
            .bind(record.created_at)
            .bind(record.expires_at)
            .bind(&record.created_ip)
            .bind(&record.created_user_agent)
            .bind(record.last_used_at)
            .bind(&record.last_used_ip)
            .bind(&record.last_used_user_agent)
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;

        // The claim: only one transaction finds revoked_at still NULL. The
        // loser's insert rolls back with the transaction.
        let claimed = sqlx::query(
            "UPDATE refresh_tokens \
             SET revoked_at = $1, replaced_by_id = $2, \
                 last_used_at = $1, last_used_ip = $3, last_used_user_agent = $4 \
             WHERE id = $5 AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(record.id)
        .bind(&record.created_ip)
        .bind(&record.created_user_agent)
        .bind(predecessor_id)
        .execute(&mut *tx)
        .await
        .map_err(io_error)?;

        if claimed.rows_affected() == 0 {
            tx.rollback().await.map_err(io_error)?;
            return Ok(RotateOutcome::Lost);
        }

        tx.commit().await.map_err(io_error)?;
        Ok(RotateOutcome::Rotated(record))
    }

    async fn revoke_refresh(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $1 WHERE id = $2 AND revoked_at IS NULL",
        )
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(io_error)?;
        Ok(res.rows_affected() > 0)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        except_hash: Option<&str>,
    ) -> Result<u64, StoreError> {
        let now = OffsetDateTime::now_utc();
        let res = match except_hash {
            Some(hash) => {
                sqlx::query(
                    "UPDATE refresh_tokens SET revoked_at = $1 \
                     WHERE user_id = $2 AND revoked_at IS NULL AND token_hash <> $3",
                )
                .bind(now)
                .bind(user_id)
                .bind(hash)
                .execute(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "UPDATE refresh_tokens SET revoked_at = $1 \
                     WHERE user_id = $2 AND revoked_at IS NULL",
                )
                .bind(now)
                .bind(user_id)
                .execute(&self.pool)
                .await
            }
        }
        .map_err(io_error)?;
        Ok(res.rows_affected())
    }

    async fn list_active_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshRecord>, StoreError> {
        sqlx::query_as::<_, RefreshRecord>(
            "SELECT * FROM refresh_tokens \
             WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > $2 \
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .bind(OffsetDateTime::now_utc())
        .fetch_all(&self.pool)
        .await
        .map_err(io_error)
    }
}
