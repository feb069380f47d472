use thiserror::Error;

/// Failures reported by an [`IdentityStore`](crate::store::IdentityStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique key (handle or email) is already taken.
    #[error("Unique constraint violated: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("An account with email {0} already exists")]
    DuplicateIdentity(String),
    #[error("No account found with {field} {value}")]
    IdentityNotFound { field: &'static str, value: String },
    #[error("Unsupported OAuth2 provider: {0}")]
    UnsupportedProvider(String),
    #[error("Provider {provider} did not supply attribute {attribute}")]
    MissingAttribute { provider: String, attribute: String },
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("No free handle could be allocated for seed {0}")]
    HandleSpaceExhausted(String),
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AccountError {
    /// True when the failure was caused by the caller's input rather than by the
    /// store or another server-side component.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AccountError::DuplicateIdentity(_)
                | AccountError::IdentityNotFound { .. }
                | AccountError::UnsupportedProvider(_)
                | AccountError::MissingAttribute { .. }
                | AccountError::InvalidRequest(_)
                | AccountError::InvalidCredentials
        )
    }

    pub(crate) fn not_found_by_username(username: &str) -> Self {
        AccountError::IdentityNotFound {
            field: "username",
            value: username.to_string(),
        }
    }

    pub(crate) fn not_found_by_email(email: &str) -> Self {
        AccountError::IdentityNotFound {
            field: "email",
            value: email.to_string(),
        }
    }
}

impl From<sea_orm::DbErr> for AccountError {
    fn from(err: sea_orm::DbErr) -> Self {
        AccountError::Store(StoreError::Database(err))
    }
}
