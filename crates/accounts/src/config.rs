use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Tuning for the unique handle allocator.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HandleConfig {
    /// Exclusive upper bound of the numeric disambiguator.
    pub suffix_upper_bound: u32,
    /// Numeric suffixes tried before switching to the token fallback.
    pub max_suffix_attempts: u32,
    pub fallback_token_len: usize,
    pub max_fallback_attempts: u32,
}

impl Default for HandleConfig {
    fn default() -> Self {
        Self {
            suffix_upper_bound: 10_000,
            max_suffix_attempts: 32,
            fallback_token_len: 8,
            max_fallback_attempts: 8,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub min_password_len: usize,
    /// Extra save attempts after the store reports a uniqueness conflict.
    pub max_conflict_retries: u32,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            min_password_len: 8,
            max_conflict_retries: 3,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Domain used to synthesize Kakao emails (`kakao_<id>@<domain>`).
    pub kakao_email_domain: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            kakao_email_domain: "kakao.com".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default)]
    pub handles: HandleConfig,
    #[serde(default)]
    pub registration: RegistrationConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "database_url must not be empty".into(),
            ));
        }
        if self.handles.suffix_upper_bound == 0 {
            return Err(ConfigError::Validation(
                "handles.suffix_upper_bound must be > 0".into(),
            ));
        }
        if self.handles.max_suffix_attempts == 0 {
            return Err(ConfigError::Validation(
                "handles.max_suffix_attempts must be > 0".into(),
            ));
        }
        if self.handles.fallback_token_len < 4 {
            return Err(ConfigError::Validation(
                "handles.fallback_token_len must be at least 4".into(),
            ));
        }
        if self.handles.max_fallback_attempts == 0 {
            return Err(ConfigError::Validation(
                "handles.max_fallback_attempts must be > 0".into(),
            ));
        }
        if self.oauth.kakao_email_domain.trim().is_empty() {
            return Err(ConfigError::Validation(
                "oauth.kakao_email_domain must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// A `.env` file in the working directory is loaded first when present. Any
/// environment variable matching a key path separated by double underscores
/// (e.g. `HANDLES__MAX_SUFFIX_ATTEMPTS`) overrides the file value.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    // Missing .env is the normal case outside development.
    let _ = dotenvy::dotenv();
    build_config(config::File::with_name("config.yaml"))
}

/// Load configuration from an explicit file path, still honouring environment overrides.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    build_config(config::File::from(path.as_ref()))
}

fn build_config<S>(file: S) -> Result<AppConfig, ConfigError>
where
    S: config::Source + Send + Sync + 'static,
{
    use config::{Config, Environment};
    let cfg = Config::builder()
        .add_source(file)
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".to_string(),
            handles: HandleConfig::default(),
            registration: RegistrationConfig::default(),
            oauth: OAuthConfig::default(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn rejects_zero_suffix_bound() {
        let mut cfg = base();
        cfg.handles.suffix_upper_bound = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_zero_suffix_attempts() {
        let mut cfg = base();
        cfg.handles.max_suffix_attempts = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_short_fallback_token() {
        let mut cfg = base();
        cfg.handles.fallback_token_len = 2;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_database_url() {
        let mut cfg = base();
        cfg.database_url = "  ".to_string();
        assert!(cfg.validate().is_err());
    }
}
