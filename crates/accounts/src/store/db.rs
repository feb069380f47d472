//! SeaORM-backed identity store.

use super::{IdentityStore, NewIdentity};
use crate::entity::user;
use crate::error::StoreError;
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, SqlErr,
};
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Clone, Debug)]
pub struct DbIdentityStore {
    db: Arc<DatabaseConnection>,
}

impl DbIdentityStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

/// Turn unique-key violations into [`StoreError::Conflict`]; everything else stays a
/// database error.
fn map_insert_error(err: DbErr) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => StoreError::Conflict(detail),
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl IdentityStore for DbIdentityStore {
    async fn find_by_handle(&self, username: &str) -> Result<Option<user::Model>, StoreError> {
        let found = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(self.db.as_ref())
            .await?;
        Ok(found)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, StoreError> {
        let found = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(self.db.as_ref())
            .await?;
        Ok(found)
    }

    #[tracing::instrument(skip(self, identity), fields(username = %identity.username))]
    async fn save(&self, identity: NewIdentity) -> Result<user::Model, StoreError> {
        let record = user::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            username: Set(identity.username),
            email: Set(identity.email),
            password_hash: Set(identity.password_hash),
            name: Set(identity.name),
            role: Set(identity.role),
            provider: Set(identity.provider),
            created_at: Set(OffsetDateTime::now_utc()),
        };

        record.insert(self.db.as_ref()).await.map_err(|e| {
            let mapped = map_insert_error(e);
            if let StoreError::Database(ref db_err) = mapped {
                tracing::error!("Failed to insert user: {}", db_err);
            }
            mapped
        })
    }
}
