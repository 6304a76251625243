//! campus-core - Core types for the campus client.
//!
//! This crate holds everything about a session that does not touch the
//! network: token and identity types, the error taxonomy, the
//! [`CredentialStore`] trait with an in-memory implementation, and the
//! [`AuthSession`] state machine.

pub mod credentials;
pub mod error;
pub mod identity;
pub mod memory;
pub mod session;
pub mod tokens;
pub mod traits;
pub mod types;

pub use credentials::{Credentials, Registration};
pub use error::{AuthError, Error, ExpiryReason};
pub use identity::{Identity, IdentityPatch};
pub use memory::MemoryStore;
pub use session::{AuthSession, SessionEvent, SessionState};
pub use tokens::{AccessToken, CredentialPair, RefreshToken, TokenKind};
pub use traits::CredentialStore;
pub use types::ApiUrl;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
