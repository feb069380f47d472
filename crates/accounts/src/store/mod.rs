//! Identity store abstraction.
//!
//! The allocator and the account services only ever talk to an
//! [`IdentityStore`]. Two implementations ship with the crate:
//!
//! - [`DbIdentityStore`] persists records through SeaORM
//! - [`MemoryIdentityStore`] keeps everything in process, used by tests and tooling
//!
//! Both enforce uniqueness of `username` and `email` at insert time and report a
//! collision as [`StoreError::Conflict`], which lets callers retry handle
//! allocation instead of relying on the earlier lookup alone.

use crate::entity::user::{self, Role};
use crate::error::StoreError;
use async_trait::async_trait;

pub mod db;
pub mod memory;

pub use db::DbIdentityStore;
pub use memory::MemoryIdentityStore;

/// The form email addresses are stored and looked up in: trimmed and lower-cased.
pub fn canonical_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// A record about to be persisted. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIdentity {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub name: String,
    pub role: Role,
    pub provider: Option<String>,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_handle(&self, username: &str) -> Result<Option<user::Model>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, StoreError>;

    /// Insert a new record, failing with [`StoreError::Conflict`] if the handle or
    /// email is already taken.
    async fn save(&self, identity: NewIdentity) -> Result<user::Model, StoreError>;
}
