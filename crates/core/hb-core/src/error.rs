//! Error taxonomy of the identity and profile operations.

use hb_identity_core::IdentityError;
use hb_identity_oauth2::OAuth2Error;
use hb_identity_session::SessionError;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state")]
    InvalidState,

    #[error("Provider authentication failure: {0}")]
    ProviderAuthFailure(#[source] OAuth2Error),

    #[error("You must log in")]
    Unauthorized,

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Provider configuration error: {0}")]
    Configuration(String),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
