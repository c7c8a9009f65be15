#![doc = include_str!("../README.md")]

pub mod config;
#[cfg(feature = "database")]
pub mod database;
pub mod error;
pub mod error_page;
pub mod identity;
pub mod issuer;
#[cfg(feature = "server")]
pub mod middleware;
pub mod pkce;
pub mod providers;
pub mod session;
pub mod store;

// Re-exports for convenient access
pub use config::ClientConfig;
pub use error::Error;
pub use error_page::{ErrorPage, render_error_page};
pub use identity::{ClientIdentity, Propagation};
pub use issuer::{AuthorizationRequest, HttpIssuer, Issuer, Tokens};
pub use pkce::Challenge;
pub use providers::{
    PROVIDER_REGISTRY, ProviderCategory, ProviderConfig, ProviderMeta, ProviderType,
    provider_meta, providers_by_category,
};
pub use session::{SessionClient, SessionData, SessionKind, SessionTokens};
pub use store::{FileStore, KeyValueStore, MemoryStore};
