//! Identity and session core of homeblocks.
//!
//! [`AuthOrchestrator`] drives the OAuth login handshake, [`AccountService`]
//! guards alias and profile changes with the session binding, and
//! [`ProfileStore`] abstracts where profile pages live.

mod accounts;
mod auth;
mod error;
mod profiles;


pub use accounts::{AccountService, AliasChange, UserPage};
pub use auth::{AuthOrchestrator, LoggedIn, LoginCompletion, LoginOption};
pub use error::{CoreError, CoreResult};
pub use profiles::{FileProfileStore, ProfileStore, empty_page};
