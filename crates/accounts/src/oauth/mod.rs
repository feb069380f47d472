//! OAuth2 provider support.
//!
//! The provider handshake itself happens elsewhere; this module starts from the
//! user-info attributes a provider returned.
//!
//! - [`normalizer`] maps provider payloads to a uniform [`OAuthUserInfo`]
//! - [`login`] matches or provisions the local account for a provider login

pub mod login;
pub mod normalizer;

pub use login::OAuthLoginService;
pub use normalizer::{KnownProvider, NormalizeFn, OAuthUserInfo, ProviderRegistry};
