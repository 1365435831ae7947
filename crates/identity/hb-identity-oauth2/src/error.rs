//! OAuth2 error types.

use thiserror::Error;

pub type OAuth2Result<T> = Result<T, OAuth2Error>;

#[derive(Debug, Error)]
pub enum OAuth2Error {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Missing authorization code")]
    MissingAuthorizationCode,

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("User info request failed: {0}")]
    UserInfoFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Descriptor I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    #[error("Invalid user info response: {0}")]
    InvalidUserInfoResponse(String),
}
