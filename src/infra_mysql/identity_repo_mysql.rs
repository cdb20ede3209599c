use super::util::{uid_as_bytes, uid_from_bytes};
use crate::application_port::AuthError;
use crate::domain_model::{Role, UserId};
use crate::domain_port::{IdentityRecord, IdentityRepo};
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

pub struct MySqlIdentityRepo {
    pool: MySqlPool,
}

impl MySqlIdentityRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlIdentityRepo { pool }
    }

    fn row_to_record(row: MySqlRow) -> Result<IdentityRecord, AuthError> {
        let user_id_bytes: Vec<u8> = row
            .try_get("user_id")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let user_id = uid_from_bytes(&user_id_bytes)?;

        let email: String = row
            .try_get("email")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let password_hash: String = row
            .try_get("password_hash")
            .map_err(|e| AuthError::Store(e.to_string()))?;

        let role_raw: String = row
            .try_get("role")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        // A role outside the known set means the table itself is bad.
        let role = role_raw
            .parse::<Role>()
            .map_err(|e| AuthError::InvariantViolation(e.to_string()))?;

        let is_active: bool = row
            .try_get("is_active")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| AuthError::Store(e.to_string()))?;

        Ok(IdentityRecord {
            user_id,
            email,
            password_hash,
            role,
            is_active,
            created_at,
        })
    }
}

#[async_trait::async_trait]
impl IdentityRepo for MySqlIdentityRepo {
    async fn find_by_email(&self, email: &str) -> Result<Option<IdentityRecord>, AuthError> {
        let row_opt: Option<MySqlRow> = sqlx::query(
            r#"
SELECT user_id, email, password_hash, role, is_active, created_at
FROM account
WHERE LOWER(email) = LOWER(?)
"#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

        row_opt.map(Self::row_to_record).transpose()
    }

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<IdentityRecord>, AuthError> {
        let row_opt: Option<MySqlRow> = sqlx::query(
            r#"
SELECT user_id, email, password_hash, role, is_active, created_at
FROM account
WHERE user_id = ?
"#,
        )
        .bind(uid_as_bytes(&user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

        row_opt.map(Self::row_to_record).transpose()
    }
}
