//! Unique handle allocation.
//!
//! A handle is derived from a seed (normally the local part of an email address).
//! The seed itself is used when free; otherwise a random decimal disambiguator is
//! appended (`alice` -> `alice4821`). The numeric search is bounded: once
//! `max_suffix_attempts` candidates have collided the allocator switches to a short
//! random alphanumeric token (`alice_k3j9x0qa`), which has far more room than the
//! 10 000 numeric variants, and gives up with [`AccountError::HandleSpaceExhausted`]
//! only if that is exhausted as well.
//!
//! The allocator only reads from the store. It does not reserve the handle it
//! returns; callers insert immediately and retry on [`StoreError::Conflict`].
//!
//! [`StoreError::Conflict`]: crate::error::StoreError::Conflict

use crate::config::HandleConfig;
use crate::error::AccountError;
use crate::store::IdentityStore;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::sync::{Mutex, PoisonError};

const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Return the part of `email` before the first `@`, if it is non-empty.
pub fn seed_from_email(email: &str) -> Option<&str> {
    match email.split_once('@') {
        Some((local, _)) if !local.is_empty() => Some(local),
        _ => None,
    }
}

pub struct HandleAllocator {
    policy: HandleConfig,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl std::fmt::Debug for HandleAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleAllocator")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl HandleAllocator {
    /// Create an allocator drawing from an entropy-seeded generator.
    pub fn new(policy: HandleConfig) -> Self {
        Self::with_rng(policy, StdRng::from_entropy())
    }

    /// Create an allocator with a caller-supplied randomness source.
    pub fn with_rng(policy: HandleConfig, rng: impl RngCore + Send + 'static) -> Self {
        Self {
            policy,
            rng: Mutex::new(Box::new(rng)),
        }
    }

    pub fn policy(&self) -> &HandleConfig {
        &self.policy
    }

    fn draw_suffix(&self) -> u32 {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen_range(0..self.policy.suffix_upper_bound.max(1))
    }

    fn draw_token(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        (0..self.policy.fallback_token_len)
            .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
            .collect()
    }

    /// Find a handle derived from `seed` that is absent from `store` right now.
    #[tracing::instrument(skip(self, store))]
    pub async fn allocate(
        &self,
        store: &dyn IdentityStore,
        seed: &str,
    ) -> Result<String, AccountError> {
        if seed.is_empty() {
            return Err(AccountError::InvalidRequest(
                "handle seed must not be empty".into(),
            ));
        }

        if store.find_by_handle(seed).await?.is_none() {
            return Ok(seed.to_string());
        }

        for attempt in 1..=self.policy.max_suffix_attempts {
            let candidate = format!("{seed}{}", self.draw_suffix());
            if store.find_by_handle(&candidate).await?.is_none() {
                return Ok(candidate);
            }
            tracing::debug!(attempt, candidate = %candidate, "Handle candidate already taken");
        }

        tracing::warn!(
            attempts = self.policy.max_suffix_attempts,
            "Numeric handle suffixes exhausted, falling back to random token"
        );

        for _ in 0..self.policy.max_fallback_attempts {
            let candidate = format!("{seed}_{}", self.draw_token());
            if store.find_by_handle(&candidate).await?.is_none() {
                return Ok(candidate);
            }
            tracing::debug!(candidate = %candidate, "Fallback handle candidate already taken");
        }

        tracing::error!("Could not allocate a unique handle");
        Err(AccountError::HandleSpaceExhausted(seed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::user::{self, Role};
    use crate::error::StoreError;
    use crate::store::{MemoryIdentityStore, NewIdentity};
    use async_trait::async_trait;

    fn seeded(seed: u64) -> HandleAllocator {
        HandleAllocator::with_rng(HandleConfig::default(), StdRng::seed_from_u64(seed))
    }

    async fn insert(store: &MemoryIdentityStore, username: &str) {
        store
            .save(NewIdentity {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password_hash: None,
                name: username.to_string(),
                role: Role::User,
                provider: None,
            })
            .await
            .unwrap();
    }

    /// Reports every handle as taken.
    struct FullStore;

    #[async_trait]
    impl IdentityStore for FullStore {
        async fn find_by_handle(&self, username: &str) -> Result<Option<user::Model>, StoreError> {
            Ok(Some(user::Model {
                id: "taken".to_string(),
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password_hash: None,
                name: username.to_string(),
                role: Role::User,
                provider: None,
                created_at: time::OffsetDateTime::now_utc(),
            }))
        }

        async fn find_by_email(&self, _email: &str) -> Result<Option<user::Model>, StoreError> {
            Ok(None)
        }

        async fn save(&self, _identity: NewIdentity) -> Result<user::Model, StoreError> {
            Err(StoreError::Conflict("full".to_string()))
        }
    }

    fn numeric_suffix(handle: &str, seed: &str) -> Option<u32> {
        handle.strip_prefix(seed)?.parse().ok()
    }

    #[test]
    fn test_seed_from_email() {
        assert_eq!(seed_from_email("bob@example.com"), Some("bob"));
        assert_eq!(seed_from_email("a@b@c"), Some("a"));
        assert_eq!(seed_from_email("@example.com"), None);
        assert_eq!(seed_from_email("no-at-sign"), None);
    }

    #[tokio::test]
    async fn test_free_seed_is_returned_unchanged() {
        let store = MemoryIdentityStore::new();
        let handle = seeded(1).allocate(&store, "alice").await.unwrap();
        assert_eq!(handle, "alice");
    }

    #[tokio::test]
    async fn test_taken_seed_gets_numeric_suffix() {
        let store = MemoryIdentityStore::new();
        insert(&store, "alice").await;
        let allocator = seeded(2);

        let first = allocator.allocate(&store, "alice").await.unwrap();
        let n = numeric_suffix(&first, "alice").expect("numeric suffix");
        assert!(n < 10_000);
        assert!(store.find_by_handle(&first).await.unwrap().is_none());

        insert(&store, &first).await;
        let second = allocator.allocate(&store, "alice").await.unwrap();
        assert_ne!(second, "alice");
        assert_ne!(second, first);
        assert!(store.find_by_handle(&second).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_nearly_full_suffix_space_still_terminates() {
        let store = MemoryIdentityStore::new();
        insert(&store, "bob").await;
        for n in 0..9_990 {
            insert(&store, &format!("bob{n}")).await;
        }

        let handle = seeded(3).allocate(&store, "bob").await.unwrap();
        assert!(handle.starts_with("bob"));
        assert!(store.find_by_handle(&handle).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exhausted_numeric_space_falls_back_to_token() {
        let policy = HandleConfig {
            suffix_upper_bound: 10,
            ..HandleConfig::default()
        };
        let allocator = HandleAllocator::with_rng(policy, StdRng::seed_from_u64(4));
        let store = MemoryIdentityStore::new();
        insert(&store, "carol").await;
        for n in 0..10 {
            insert(&store, &format!("carol{n}")).await;
        }

        let handle = allocator.allocate(&store, "carol").await.unwrap();
        let token = handle.strip_prefix("carol_").expect("token fallback");
        assert_eq!(token.len(), 8);
        assert!(
            token
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        );
    }

    #[tokio::test]
    async fn test_fully_taken_space_is_reported() {
        let err = seeded(5).allocate(&FullStore, "dave").await.unwrap_err();
        assert!(matches!(err, AccountError::HandleSpaceExhausted(ref s) if s == "dave"));
    }

    #[tokio::test]
    async fn test_empty_seed_is_rejected() {
        let store = MemoryIdentityStore::new();
        let err = seeded(6).allocate(&store, "").await.unwrap_err();
        assert!(matches!(err, AccountError::InvalidRequest(_)));
    }
}
