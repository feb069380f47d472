//! Account provisioning for OAuth2 logins.
//!
//! On every provider login the user-info payload is normalized and matched to an
//! account by email. The first login creates the account: the handle is allocated
//! from the email's local part exactly like a regular registration, there is no
//! local password, and the provider name is recorded on the record.

use crate::entity::user::{self, Role};
use crate::error::AccountError;
use crate::handle::{HandleAllocator, seed_from_email};
use crate::oauth::normalizer::{OAuthUserInfo, ProviderRegistry};
use crate::registration::persist_with_unique_handle;
use crate::store::{IdentityStore, NewIdentity, canonical_email};
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct OAuthLoginService {
    store: Arc<dyn IdentityStore>,
    allocator: Arc<HandleAllocator>,
    registry: Arc<ProviderRegistry>,
    max_conflict_retries: u32,
}

impl OAuthLoginService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        allocator: Arc<HandleAllocator>,
        registry: Arc<ProviderRegistry>,
        max_conflict_retries: u32,
    ) -> Self {
        Self {
            store,
            allocator,
            registry,
            max_conflict_retries,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Normalize the provider payload and return the matching account, creating it on
    /// first login.
    #[tracing::instrument(skip(self, attributes))]
    pub async fn load_user(
        &self,
        provider: &str,
        attributes: &Value,
    ) -> Result<user::Model, AccountError> {
        let info = self.registry.normalize(provider, attributes)?;
        self.get_or_create_user(info).await
    }

    /// Return the account for `info.email`, creating it if none exists.
    #[tracing::instrument(skip(self, info), fields(provider = %info.provider))]
    pub async fn get_or_create_user(
        &self,
        info: OAuthUserInfo,
    ) -> Result<user::Model, AccountError> {
        let email = canonical_email(&info.email);

        if let Some(existing) = self.store.find_by_email(&email).await? {
            tracing::debug!(user_id = %existing.id, "Existing account matched by email");
            return Ok(existing);
        }

        let seed = seed_from_email(&email)
            .ok_or_else(|| {
                AccountError::InvalidRequest(format!(
                    "{} returned an email without a local part",
                    info.provider
                ))
            })?
            .to_string();

        let template = NewIdentity {
            username: String::new(),
            email: email.clone(),
            password_hash: None,
            name: info.name.clone().unwrap_or_else(|| seed.clone()),
            role: Role::User,
            provider: Some(info.provider.clone()),
        };

        let created = persist_with_unique_handle(
            self.store.as_ref(),
            &self.allocator,
            &seed,
            self.max_conflict_retries,
            template,
        )
        .await;

        match created {
            Ok(user) => {
                tracing::info!(
                    user_id = %user.id,
                    username = %user.username,
                    "Created account for first OAuth2 login"
                );
                Ok(user)
            }
            // A concurrent first login for the same email won the insert.
            Err(AccountError::DuplicateIdentity(_)) => self
                .store
                .find_by_email(&email)
                .await?
                .ok_or_else(|| AccountError::not_found_by_email(&email)),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HandleConfig, OAuthConfig};
    use crate::store::MemoryIdentityStore;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::json;

    fn service(store: Arc<MemoryIdentityStore>) -> OAuthLoginService {
        OAuthLoginService::new(
            store,
            Arc::new(HandleAllocator::with_rng(
                HandleConfig::default(),
                StdRng::seed_from_u64(21),
            )),
            Arc::new(ProviderRegistry::with_defaults(&OAuthConfig::default())),
            3,
        )
    }

    #[tokio::test]
    async fn test_first_login_creates_account_once() {
        let store = Arc::new(MemoryIdentityStore::new());
        let svc = service(store.clone());
        let attrs = json!({"id": 42, "properties": {"nickname": "Bob"}});

        let first = svc.load_user("kakao", &attrs).await.unwrap();
        assert_eq!(first.username, "kakao_42");
        assert_eq!(first.email, "kakao_42@kakao.com");
        assert_eq!(first.name, "Bob");
        assert_eq!(first.provider.as_deref(), Some("kakao"));
        assert!(first.password_hash.is_none());

        let second = svc.load_user("kakao", &attrs).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_handle_collision_with_local_account() {
        let store = Arc::new(MemoryIdentityStore::new());
        store
            .save(NewIdentity {
                username: "ann".to_string(),
                email: "ann@example.com".to_string(),
                password_hash: Some("x".to_string()),
                name: "ann".to_string(),
                role: Role::User,
                provider: None,
            })
            .await
            .unwrap();
        let svc = service(store.clone());

        let user = svc
            .load_user("google", &json!({"email": "Ann@gmail.com"}))
            .await
            .unwrap();
        assert_ne!(user.username, "ann");
        assert!(user.username.starts_with("ann"));
        assert_eq!(user.email, "ann@gmail.com");
        assert_eq!(user.name, "ann");
    }

    #[tokio::test]
    async fn test_unsupported_provider_creates_nothing() {
        let store = Arc::new(MemoryIdentityStore::new());
        let svc = service(store.clone());

        let err = svc
            .load_user("myspace", &json!({"email": "tom@myspace.com"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::UnsupportedProvider(_)));
        assert!(store.is_empty());
    }
}
