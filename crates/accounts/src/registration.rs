//! Account registration ("join").
//!
//! A join request carries an email and a password. The local part of the email
//! seeds the handle and doubles as the initial display name. Registration fails
//! with [`AccountError::DuplicateIdentity`] when the email is already known and
//! never creates a second record for the same address.

use crate::config::RegistrationConfig;
use crate::entity::user::{self, Role};
use crate::error::{AccountError, StoreError};
use crate::handle::{HandleAllocator, seed_from_email};
use crate::password::hash_password;
use crate::store::{IdentityStore, NewIdentity, canonical_email};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Deserialize)]
pub struct JoinRequest {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for JoinRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinResponse {
    pub id: String,
    pub username: String,
}

/// Allocate a handle for `seed` and insert `template` under it.
///
/// The allocator's lookup and the insert are not atomic, so a concurrent request can
/// take the same handle in between. The store rejects that insert with
/// [`StoreError::Conflict`]; we then check whether the email itself is now taken
/// (a duplicate registration) and otherwise allocate again, at most
/// `max_conflict_retries` more times.
pub(crate) async fn persist_with_unique_handle(
    store: &dyn IdentityStore,
    allocator: &HandleAllocator,
    seed: &str,
    max_conflict_retries: u32,
    template: NewIdentity,
) -> Result<user::Model, AccountError> {
    let mut retries = 0;
    loop {
        let username = allocator.allocate(store, seed).await?;
        let draft = NewIdentity {
            username,
            ..template.clone()
        };

        match store.save(draft).await {
            Ok(saved) => return Ok(saved),
            Err(StoreError::Conflict(detail)) => {
                if store.find_by_email(&template.email).await?.is_some() {
                    return Err(AccountError::DuplicateIdentity(template.email));
                }
                if retries >= max_conflict_retries {
                    return Err(StoreError::Conflict(detail).into());
                }
                retries += 1;
                tracing::warn!(
                    retries,
                    detail = %detail,
                    "Handle was claimed concurrently, allocating again"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Trim, lower-case and check the shape of an email. Returns the normalized email.
fn normalize_email(raw: &str) -> Result<String, AccountError> {
    let email = canonical_email(raw);
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AccountError::InvalidRequest(
            "Please enter a valid email address".into(),
        )),
    }
}

#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn IdentityStore>,
    allocator: Arc<HandleAllocator>,
    config: RegistrationConfig,
}

impl RegistrationService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        allocator: Arc<HandleAllocator>,
        config: RegistrationConfig,
    ) -> Self {
        Self {
            store,
            allocator,
            config,
        }
    }

    #[tracing::instrument(skip(self, request), fields(email = %request.email))]
    pub async fn join(&self, request: JoinRequest) -> Result<JoinResponse, AccountError> {
        let email = normalize_email(&request.email)?;

        if request.password.chars().count() < self.config.min_password_len {
            return Err(AccountError::InvalidRequest(format!(
                "Password must be at least {} characters",
                self.config.min_password_len
            )));
        }

        if self.store.find_by_email(&email).await?.is_some() {
            tracing::info!("Registration rejected, email already in use");
            return Err(AccountError::DuplicateIdentity(email));
        }

        let seed = seed_from_email(&email)
            .ok_or_else(|| AccountError::InvalidRequest("Email has no local part".into()))?
            .to_string();

        let password_hash = hash_password(&request.password)?;

        let template = NewIdentity {
            username: String::new(),
            email,
            password_hash: Some(password_hash),
            name: seed.clone(),
            role: Role::User,
            provider: None,
        };

        let user = persist_with_unique_handle(
            self.store.as_ref(),
            &self.allocator,
            &seed,
            self.config.max_conflict_retries,
            template,
        )
        .await?;

        tracing::info!(user_id = %user.id, username = %user.username, "User registered");

        Ok(JoinResponse {
            id: user.id,
            username: user.username,
        })
    }
}
