use crate::application_port::AuthError;
use crate::domain_model::UserId;
use crate::domain_port::{IdentityRecord, IdentityRepo};
use dashmap::DashMap;

/// In-process account directory for the development backend and tests.
#[derive(Default)]
pub struct MemoryIdentityRepo {
    accounts: DashMap<UserId, IdentityRecord>,
}

impl MemoryIdentityRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: IdentityRecord) {
        self.accounts.insert(record.user_id, record);
    }

    pub fn remove(&self, user_id: &UserId) -> Option<IdentityRecord> {
        self.accounts.remove(user_id).map(|(_, record)| record)
    }
}

#[async_trait::async_trait]
impl IdentityRepo for MemoryIdentityRepo {
    async fn find_by_email(&self, email: &str) -> Result<Option<IdentityRecord>, AuthError> {
        let wanted = email.to_lowercase();
        Ok(self
            .accounts
            .iter()
            .find(|entry| entry.value().email.to_lowercase() == wanted)
            .map(|entry| entry.value().clone()))
    }

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<IdentityRecord>, AuthError> {
        Ok(self.accounts.get(&user_id).map(|entry| entry.value().clone()))
    }
}
