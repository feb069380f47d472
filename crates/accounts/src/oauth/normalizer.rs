//! Maps provider-specific user-info payloads to [`OAuthUserInfo`].
//!
//! Each provider nests the fields differently:
//!
//! | provider | email | name |
//! |---|---|---|
//! | `google` | `email` | `name` |
//! | `kakao` | `kakao_<id>@<domain>` (Kakao does not always share an email) | `properties.nickname` |
//! | `naver` | `response.email` | `response.name` |
//!
//! Dispatch goes through a [`ProviderRegistry`], so additional providers can be
//! registered at startup without touching the built-in ones.

use crate::config::OAuthConfig;
use crate::error::AccountError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// Normalized identity data from an external provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthUserInfo {
    pub email: String,
    pub name: Option<String>,
    pub provider: String,
}

/// Providers with a built-in normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownProvider {
    Google,
    Kakao,
    Naver,
}

impl KnownProvider {
    pub const ALL: [KnownProvider; 3] =
        [KnownProvider::Google, KnownProvider::Kakao, KnownProvider::Naver];

    pub fn as_str(&self) -> &'static str {
        match self {
            KnownProvider::Google => "google",
            KnownProvider::Kakao => "kakao",
            KnownProvider::Naver => "naver",
        }
    }
}

impl std::fmt::Display for KnownProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KnownProvider {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(KnownProvider::Google),
            "kakao" => Ok(KnownProvider::Kakao),
            "naver" => Ok(KnownProvider::Naver),
            other => Err(AccountError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// A provider-specific normalization function.
pub type NormalizeFn = Arc<dyn Fn(&Value) -> Result<OAuthUserInfo, AccountError> + Send + Sync>;

/// Follow `path` through nested JSON objects.
fn lookup<'a>(attributes: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(attributes, |current, key| current.get(key))
}

/// Read a scalar attribute as text. Numbers are rendered in decimal (Kakao ids are numeric).
fn text_at(attributes: &Value, path: &[&str]) -> Option<String> {
    match lookup(attributes, path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn require_text(provider: &str, attributes: &Value, path: &[&str]) -> Result<String, AccountError> {
    text_at(attributes, path).ok_or_else(|| AccountError::MissingAttribute {
        provider: provider.to_string(),
        attribute: path.join("."),
    })
}

fn normalize_google(attributes: &Value) -> Result<OAuthUserInfo, AccountError> {
    let provider = KnownProvider::Google.as_str();
    Ok(OAuthUserInfo {
        email: require_text(provider, attributes, &["email"])?,
        name: text_at(attributes, &["name"]),
        provider: provider.to_string(),
    })
}

fn normalize_kakao(email_domain: &str, attributes: &Value) -> Result<OAuthUserInfo, AccountError> {
    let provider = KnownProvider::Kakao.as_str();
    let id = require_text(provider, attributes, &["id"])?;
    Ok(OAuthUserInfo {
        email: format!("{provider}_{id}@{email_domain}"),
        name: text_at(attributes, &["properties", "nickname"]),
        provider: provider.to_string(),
    })
}

fn normalize_naver(attributes: &Value) -> Result<OAuthUserInfo, AccountError> {
    let provider = KnownProvider::Naver.as_str();
    Ok(OAuthUserInfo {
        email: require_text(provider, attributes, &["response", "email"])?,
        name: text_at(attributes, &["response", "name"]),
        provider: provider.to_string(),
    })
}

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    normalizers: HashMap<String, NormalizeFn>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}

impl ProviderRegistry {
    /// A registry with no providers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry holding the built-in `google`, `kakao` and `naver` normalizers.
    pub fn with_defaults(config: &OAuthConfig) -> Self {
        let mut registry = Self::empty();
        let kakao_domain = config.kakao_email_domain.clone();

        for provider in KnownProvider::ALL {
            match provider {
                KnownProvider::Google => registry.register(provider.as_str(), normalize_google),
                KnownProvider::Kakao => {
                    let domain = kakao_domain.clone();
                    registry.register(provider.as_str(), move |attrs: &Value| {
                        normalize_kakao(&domain, attrs)
                    })
                }
                KnownProvider::Naver => registry.register(provider.as_str(), normalize_naver),
            }
        }
        registry
    }

    /// Add or replace the normalizer for `provider`.
    pub fn register<F>(&mut self, provider: impl Into<String>, normalize: F)
    where
        F: Fn(&Value) -> Result<OAuthUserInfo, AccountError> + Send + Sync + 'static,
    {
        self.normalizers.insert(provider.into(), Arc::new(normalize));
    }

    pub fn supports(&self, provider: &str) -> bool {
        self.normalizers.contains_key(provider)
    }

    /// Registered provider names, sorted.
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.normalizers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Normalize `attributes` as returned by `provider`.
    ///
    /// Unknown providers fail with [`AccountError::UnsupportedProvider`] before the
    /// attributes are inspected.
    pub fn normalize(
        &self,
        provider: &str,
        attributes: &Value,
    ) -> Result<OAuthUserInfo, AccountError> {
        let normalize = self
            .normalizers
            .get(provider)
            .ok_or_else(|| AccountError::UnsupportedProvider(provider.to_string()))?;
        normalize(attributes)
    }
}
