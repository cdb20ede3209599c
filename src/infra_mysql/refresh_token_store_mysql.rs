use super::util::{downcast, is_dup_key, uid_as_bytes, uid_from_bytes};
use crate::application_port::AuthError;
use crate::domain_model::UserId;
use crate::domain_port::{RefreshTokenId, RefreshTokenRecord, RefreshTokenStore, StorageTx};
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{Executor, MySql, MySqlPool, Row};

pub struct MySqlRefreshTokenStore {
    pool: MySqlPool,
}

impl MySqlRefreshTokenStore {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlRefreshTokenStore { pool }
    }

    fn row_to_record(row: MySqlRow) -> Result<RefreshTokenRecord, AuthError> {
        let id: u64 = row
            .try_get("id")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let token_hash: String = row
            .try_get("token_hash")
            .map_err(|e| AuthError::Store(e.to_string()))?;

        let user_id_bytes: Vec<u8> = row
            .try_get("user_id")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let user_id = uid_from_bytes(&user_id_bytes)?;

        let expires_at: DateTime<Utc> = row
            .try_get("expires_at")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let revoked: bool = row
            .try_get("revoked")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| AuthError::Store(e.to_string()))?;

        Ok(RefreshTokenRecord {
            id: RefreshTokenId(id),
            token_hash,
            user_id,
            expires_at,
            revoked,
            created_at,
        })
    }

    async fn insert_on<'e, E>(
        executor: E,
        token_hash: &str,
        user_id: UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError>
    where
        E: Executor<'e, Database = MySql>,
    {
        sqlx::query(
            r#"
INSERT INTO refresh_token (token_hash, user_id, expires_at)
VALUES (?, ?, ?)
"#,
        )
        .bind(token_hash)
        .bind(uid_as_bytes(&user_id))
        .bind(expires_at)
        .execute(executor)
        .await
        .map_err(|e| {
            if is_dup_key(&e) {
                // token_hash carries a unique index.
                AuthError::InvariantViolation("duplicate refresh token digest".to_string())
            } else {
                AuthError::Store(e.to_string())
            }
        })?;

        Ok(())
    }

    async fn revoke_on<'e, E>(executor: E, id: RefreshTokenId) -> Result<bool, AuthError>
    where
        E: Executor<'e, Database = MySql>,
    {
        // The WHERE guard makes the flip a compare-and-swap: a racing
        // rotation sees zero rows touched.
        let res = sqlx::query(
            r#"
UPDATE refresh_token
SET revoked = 1
WHERE id = ? AND revoked = 0
"#,
        )
        .bind(id.0)
        .execute(executor)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

        Ok(res.rows_affected() == 1)
    }
}

#[async_trait::async_trait]
impl RefreshTokenStore for MySqlRefreshTokenStore {
    async fn create(
        &self,
        token_hash: &str,
        user_id: UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        Self::insert_on(&self.pool, token_hash, user_id, expires_at).await
    }

    async fn create_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        token_hash: &str,
        user_id: UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx);
        Self::insert_on(tx.conn(), token_hash, user_id, expires_at).await
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, AuthError> {
        let row_opt: Option<MySqlRow> = sqlx::query(
            r#"
SELECT id, token_hash, user_id, expires_at, revoked, created_at
FROM refresh_token
WHERE token_hash = ?
"#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

        row_opt.map(Self::row_to_record).transpose()
    }

    async fn mark_revoked(&self, id: RefreshTokenId) -> Result<bool, AuthError> {
        Self::revoke_on(&self.pool, id).await
    }

    async fn mark_revoked_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        id: RefreshTokenId,
    ) -> Result<bool, AuthError> {
        let tx = downcast(tx);
        Self::revoke_on(tx.conn(), id).await
    }

    async fn delete_expired(&self) -> Result<u64, AuthError> {
        let res = sqlx::query(
            r#"
DELETE FROM refresh_token
WHERE expires_at <= ?
"#,
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

        Ok(res.rows_affected())
    }
}
