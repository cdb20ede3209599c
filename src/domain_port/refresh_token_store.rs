use crate::application_port::AuthError;
use crate::domain_model::UserId;
use crate::domain_port::repo_tx::StorageTx;
use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct RefreshTokenId(pub u64);

impl fmt::Display for RefreshTokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One issued refresh secret, persisted as its digest only. `revoked` moves
/// false -> true exactly once and is never reset.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: RefreshTokenId,
    pub token_hash: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    /// Acceptable for rotation: not revoked and not yet expired.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }
}

#[async_trait::async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Insert a record for a freshly generated secret. The digest is unique;
    /// a collision is a store-level invariant violation.
    async fn create(
        &self,
        token_hash: &str,
        user_id: UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    async fn create_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        token_hash: &str,
        user_id: UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    /// Lookup is by digest only; the plaintext never reaches the store.
    async fn find_by_hash(&self, token_hash: &str)
    -> Result<Option<RefreshTokenRecord>, AuthError>;

    /// Flip `revoked` to true iff it is still false. Returns whether this
    /// call performed the flip; a concurrent winner makes the loser see
    /// `false`.
    async fn mark_revoked(&self, id: RefreshTokenId) -> Result<bool, AuthError>;

    async fn mark_revoked_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        id: RefreshTokenId,
    ) -> Result<bool, AuthError>;

    /// Drop records whose expiry has passed. Hygiene only; expiry is always
    /// re-checked at use.
    async fn delete_expired(&self) -> Result<u64, AuthError>;
}
