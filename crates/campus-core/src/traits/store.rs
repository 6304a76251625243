//! Credential store trait.

use std::time::Duration;

use crate::Result;
use crate::tokens::{AccessToken, RefreshToken, TokenKind};

/// Durable key/value storage for the session's tokens.
///
/// A store is a blind surface: it never inspects token contents. Operations
/// are synchronous so that a caller can read and decide without another task
/// interleaving, and each operation is atomic per key.
///
/// `ttl` is a lifetime hint; once it passes, `get` reports the token absent.
pub trait CredentialStore: Send + Sync {
    /// Read a token, or `None` if absent or past its lifetime.
    fn get(&self, kind: TokenKind) -> Result<Option<String>>;

    /// Write a token with a lifetime hint.
    fn set(&self, kind: TokenKind, token: &str, ttl: Duration) -> Result<()>;

    /// Remove every stored token.
    fn clear(&self) -> Result<()>;

    /// Read the access token.
    fn access_token(&self) -> Result<Option<AccessToken>> {
        Ok(self.get(TokenKind::Access)?.map(AccessToken::new))
    }

    /// Read the refresh token.
    fn refresh_token(&self) -> Result<Option<RefreshToken>> {
        Ok(self.get(TokenKind::Refresh)?.map(RefreshToken::new))
    }

    /// Returns true if either token is stored.
    fn has_credentials(&self) -> Result<bool> {
        Ok(self.get(TokenKind::Access)?.is_some() || self.get(TokenKind::Refresh)?.is_some())
    }
}
