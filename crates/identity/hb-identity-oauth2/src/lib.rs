//! OAuth2 identity provider adapters.
//!
//! Each configured provider is described by a descriptor file and resolved to
//! a [`ProviderAdapter`] that can build authorization URLs and exchange an
//! authorization code for a verified, provider-scoped user id. The
//! [`PendingStateStore`] keeps the state tokens of login flows in progress.

mod client;
mod config;
mod error;
mod provider;
mod state;
mod types;


pub use client::{OAuth2Client, PkceChallenge};
pub use config::{
    OAuth2Config, OAuth2ProviderConfig, ProviderCredentials, ProviderDescriptor, ProviderKind,
};
pub use error::{OAuth2Error, OAuth2Result};
pub use provider::{ProviderAdapter, ProviderRegistry};
pub use state::{InMemoryStateStore, PendingState, PendingStateStore};
pub use types::{ExternalCredential, ExternalIdentity, TokenResponse};
