//! In-process identity store backed by `DashMap`.

use super::{IdentityStore, NewIdentity};
use crate::entity::user;
use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use time::OffsetDateTime;

/// Records keyed by username, with a secondary email index.
///
/// Inserts lock the email entry before the username entry, so two concurrent saves
/// can never both claim the same email or handle.
#[derive(Clone, Default)]
pub struct MemoryIdentityStore {
    by_username: Arc<DashMap<String, user::Model>>,
    email_index: Arc<DashMap<String, String>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_username.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_username.is_empty()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_handle(&self, username: &str) -> Result<Option<user::Model>, StoreError> {
        Ok(self.by_username.get(username).map(|r| r.value().clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, StoreError> {
        let Some(username) = self.email_index.get(email).map(|r| r.value().clone()) else {
            return Ok(None);
        };
        Ok(self.by_username.get(&username).map(|r| r.value().clone()))
    }

    async fn save(&self, identity: NewIdentity) -> Result<user::Model, StoreError> {
        let email_slot = match self.email_index.entry(identity.email.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::Conflict(format!(
                    "email {} already registered",
                    identity.email
                )));
            }
            Entry::Vacant(slot) => slot,
        };
        let username_slot = match self.by_username.entry(identity.username.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::Conflict(format!(
                    "username {} already taken",
                    identity.username
                )));
            }
            Entry::Vacant(slot) => slot,
        };

        let model = user::Model {
            id: uuid::Uuid::new_v4().to_string(),
            username: identity.username.clone(),
            email: identity.email,
            password_hash: identity.password_hash,
            name: identity.name,
            role: identity.role,
            provider: identity.provider,
            created_at: OffsetDateTime::now_utc(),
        };
        username_slot.insert(model.clone());
        email_slot.insert(identity.username);
        Ok(model)
    }
}
