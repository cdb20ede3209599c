use crate::application_port::AuthError;
use crate::domain_model::{Role, UserId};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct IdentityRecord {
    pub user_id: UserId,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Account lookup, owned by user management. Consumed here read-only.
#[async_trait::async_trait]
pub trait IdentityRepo: Send + Sync {
    /// Fetch by email (for login). Lookup is case-insensitive.
    async fn find_by_email(&self, email: &str) -> Result<Option<IdentityRecord>, AuthError>;

    /// Fetch by id (for rotation, after the record's owner is known).
    async fn find_by_id(&self, user_id: UserId) -> Result<Option<IdentityRecord>, AuthError>;
}
