use crate::application_port::AuthError;
use crate::domain_model::UserId;
use crate::domain_port::{RefreshTokenId, RefreshTokenRecord, RefreshTokenStore, StorageTx};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-process refresh token store. Keyed by digest, which is unique per
/// record. The revoked flip happens under the entry's shard lock, so the
/// at-most-one-winner property holds here as well as in SQL.
#[derive(Default)]
pub struct MemoryRefreshTokenStore {
    records: DashMap<String, RefreshTokenRecord>,
    next_id: AtomicU64,
}

impl MemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait::async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn create(
        &self,
        token_hash: &str,
        user_id: UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        if self.records.contains_key(token_hash) {
            return Err(AuthError::InvariantViolation(
                "duplicate refresh token digest".to_string(),
            ));
        }
        let id = RefreshTokenId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.records.insert(
            token_hash.to_string(),
            RefreshTokenRecord {
                id,
                token_hash: token_hash.to_string(),
                user_id,
                expires_at,
                revoked: false,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn create_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        token_hash: &str,
        user_id: UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        self.create(token_hash, user_id, expires_at).await
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, AuthError> {
        Ok(self.records.get(token_hash).map(|entry| entry.value().clone()))
    }

    async fn mark_revoked(&self, id: RefreshTokenId) -> Result<bool, AuthError> {
        for mut entry in self.records.iter_mut() {
            let record = entry.value_mut();
            if record.id == id {
                if record.revoked {
                    return Ok(false);
                }
                record.revoked = true;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn mark_revoked_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        id: RefreshTokenId,
    ) -> Result<bool, AuthError> {
        self.mark_revoked(id).await
    }

    async fn delete_expired(&self) -> Result<u64, AuthError> {
        let before = self.records.len();
        let now = Utc::now();
        self.records.retain(|_, record| record.expires_at > now);
        Ok((before - self.records.len()) as u64)
    }
}
