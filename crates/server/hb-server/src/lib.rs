//! HTTP surface of homeblocks: login handshake, session cookie, user pages,
//! profile editing and alias changes.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::ApiError;
pub use routes::{SESSION_COOKIE, callback_path, router};
pub use state::AppState;
