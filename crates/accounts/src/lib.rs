//! Account registration, unique handle allocation and OAuth2 profile normalization.
//!
//! This crate is the identity slice of a web application's authentication layer:
//! it registers local accounts, allocates collision-free handles from email
//! addresses, resolves login names for the authentication layer and provisions
//! accounts for OAuth2 logins. HTTP routing and token issuance live elsewhere.

use std::sync::Arc;

use sea_orm::{Database, DatabaseConnection};

use crate::config::AppConfig;
use crate::handle::HandleAllocator;
use crate::oauth::{OAuthLoginService, ProviderRegistry};
use crate::registration::RegistrationService;
use crate::store::{DbIdentityStore, IdentityStore};
use crate::users::UserService;

pub mod config;
pub mod entity;
pub mod error;
pub mod handle;
pub mod oauth;
pub mod password;
pub mod registration;
pub mod store;
pub mod users;

#[derive(Clone, Debug)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
}

impl AppResources {
    /// Connect to `config.database_url`.
    pub async fn connect(config: AppConfig) -> Result<Self, sea_orm::DbErr> {
        let db = Database::connect(&config.database_url).await?;
        tracing::info!("Connected to account database");
        Ok(Self {
            db: Arc::new(db),
            config: Arc::new(config),
        })
    }

    /// Build the account services on top of the SeaORM store.
    pub fn services(&self) -> AccountServices {
        let store: Arc<dyn IdentityStore> = Arc::new(DbIdentityStore::new(self.db.clone()));
        AccountServices::new(store, &self.config)
    }
}

/// The account services sharing one store and one handle allocator.
#[derive(Clone)]
pub struct AccountServices {
    pub registration: RegistrationService,
    pub users: UserService,
    pub oauth: OAuthLoginService,
}

impl AccountServices {
    pub fn new(store: Arc<dyn IdentityStore>, config: &AppConfig) -> Self {
        let allocator = Arc::new(HandleAllocator::new(config.handles.clone()));
        Self::with_allocator(store, allocator, config)
    }

    /// Like [`AccountServices::new`] but with a caller-built allocator, e.g. one with a
    /// deterministic randomness source.
    pub fn with_allocator(
        store: Arc<dyn IdentityStore>,
        allocator: Arc<HandleAllocator>,
        config: &AppConfig,
    ) -> Self {
        let registry = Arc::new(ProviderRegistry::with_defaults(&config.oauth));
        Self {
            registration: RegistrationService::new(
                store.clone(),
                allocator.clone(),
                config.registration.clone(),
            ),
            users: UserService::new(store.clone()),
            oauth: OAuthLoginService::new(
                store,
                allocator,
                registry,
                config.registration.max_conflict_retries,
            ),
        }
    }
}
