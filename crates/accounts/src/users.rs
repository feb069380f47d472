//! User lookup for the authentication layer.
//!
//! A login name may be either a handle or an email address; anything containing
//! `@` is treated as an email.

use crate::entity::user::{self, Role};
use crate::error::AccountError;
use crate::password::verify_password;
use crate::store::{IdentityStore, canonical_email};
use std::sync::Arc;

/// The principal handed to the authentication layer after a successful lookup.
#[derive(Clone, PartialEq, Eq)]
pub struct UserDetails {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: Role,
}

impl UserDetails {
    /// Granted authorities, e.g. `ROLE_USER`.
    pub fn authorities(&self) -> Vec<String> {
        vec![format!("ROLE_{}", self.role)]
    }
}

impl std::fmt::Debug for UserDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDetails")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl From<user::Model> for UserDetails {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            password_hash: model.password_hash,
            role: model.role,
        }
    }
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn IdentityStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_by_username(&self, username: &str) -> Result<user::Model, AccountError> {
        self.store
            .find_by_handle(username)
            .await?
            .ok_or_else(|| AccountError::not_found_by_username(username))
    }

    /// Look up an account by email, matching case-insensitively.
    #[tracing::instrument(skip(self))]
    pub async fn find_by_email(&self, email: &str) -> Result<user::Model, AccountError> {
        let email = canonical_email(email);
        self.store
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AccountError::not_found_by_email(&email))
    }

    /// Resolve a login name (handle or email) to the account's details.
    pub async fn load_user_by_username(&self, login: &str) -> Result<UserDetails, AccountError> {
        let user = if login.contains('@') {
            self.find_by_email(login).await?
        } else {
            self.find_by_username(login).await?
        };
        Ok(user.into())
    }

    /// Verify a login name and password.
    ///
    /// Unknown logins, accounts without a local password and wrong passwords are all
    /// reported as [`AccountError::InvalidCredentials`] so callers cannot tell them apart.
    #[tracing::instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        login: &str,
        password: &str,
    ) -> Result<UserDetails, AccountError> {
        let details = match self.load_user_by_username(login).await {
            Ok(details) => details,
            Err(AccountError::IdentityNotFound { .. }) => {
                return Err(AccountError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        };

        if !verify_password(password, details.password_hash.as_deref()) {
            tracing::info!(user_id = %details.id, "Password authentication failed");
            return Err(AccountError::InvalidCredentials);
        }

        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::hash_password;
    use crate::store::{MemoryIdentityStore, NewIdentity};

    async fn seeded_store() -> Arc<MemoryIdentityStore> {
        let store = Arc::new(MemoryIdentityStore::new());
        store
            .save(NewIdentity {
                username: "grace".to_string(),
                email: "grace@example.com".to_string(),
                password_hash: Some(hash_password("s3cret-pass").unwrap()),
                name: "grace".to_string(),
                role: Role::User,
                provider: None,
            })
            .await
            .unwrap();
        store
            .save(NewIdentity {
                username: "heidi".to_string(),
                email: "heidi@gmail.com".to_string(),
                password_hash: None,
                name: "Heidi".to_string(),
                role: Role::Admin,
                provider: Some("google".to_string()),
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_load_user_routes_on_at_sign() {
        let svc = UserService::new(seeded_store().await);

        let by_email = svc.load_user_by_username("grace@example.com").await.unwrap();
        let by_handle = svc.load_user_by_username("grace").await.unwrap();
        assert_eq!(by_email, by_handle);
        assert_eq!(by_handle.authorities(), vec!["ROLE_USER".to_string()]);
    }

    #[tokio::test]
    async fn test_email_login_ignores_case_and_whitespace() {
        let svc = UserService::new(seeded_store().await);

        let details = svc
            .load_user_by_username(" Grace@Example.COM ")
            .await
            .unwrap();
        assert_eq!(details.username, "grace");

        let ok = svc
            .authenticate("GRACE@example.com", "s3cret-pass")
            .await
            .unwrap();
        assert_eq!(ok.email, "grace@example.com");
    }

    #[tokio::test]
    async fn test_missing_user_is_not_found() {
        let svc = UserService::new(seeded_store().await);

        let err = svc.find_by_username("mallory").await.unwrap_err();
        assert!(matches!(
            err,
            AccountError::IdentityNotFound { field: "username", ref value } if value == "mallory"
        ));

        let err = svc
            .load_user_by_username("mallory@example.com")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccountError::IdentityNotFound { field: "email", .. }
        ));
    }

    #[tokio::test]
    async fn test_authenticate() {
        let svc = UserService::new(seeded_store().await);

        let ok = svc.authenticate("grace", "s3cret-pass").await.unwrap();
        assert_eq!(ok.username, "grace");

        assert!(matches!(
            svc.authenticate("grace@example.com", "wrong").await,
            Err(AccountError::InvalidCredentials)
        ));
        assert!(matches!(
            svc.authenticate("nobody", "s3cret-pass").await,
            Err(AccountError::InvalidCredentials)
        ));
        // OAuth2-only accounts have no local password.
        assert!(matches!(
            svc.authenticate("heidi", "").await,
            Err(AccountError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_admin_authorities_and_debug_redaction() {
        let details = UserDetails {
            id: "1".to_string(),
            username: "root".to_string(),
            email: "root@example.com".to_string(),
            password_hash: Some("$argon2id$secret".to_string()),
            role: Role::Admin,
        };
        assert_eq!(details.authorities(), vec!["ROLE_ADMIN".to_string()]);
        assert!(!format!("{details:?}").contains("argon2id"));
    }
}
