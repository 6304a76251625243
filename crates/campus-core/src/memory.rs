//! In-memory credential store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::Result;
use crate::tokens::TokenKind;
use crate::traits::CredentialStore;

/// A process-local [`CredentialStore`].
///
/// Tokens live only as long as the store; use it for tests and for
/// embedders that persist credentials themselves.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<TokenKind, Entry>>,
}

#[derive(Debug, Clone)]
struct Entry {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<TokenKind, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, kind: TokenKind) -> Result<Option<String>> {
        let mut entries = self.entries();
        let expired = entries
            .get(&kind)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= Utc::now());
        if expired {
            entries.remove(&kind);
            return Ok(None);
        }
        Ok(entries.get(&kind).map(|e| e.token.clone()))
    }

    fn set(&self, kind: TokenKind, token: &str, ttl: Duration) -> Result<()> {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        self.entries().insert(
            kind,
            Entry {
                token: token.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_clear() {
        let store = MemoryStore::new();
        assert!(!store.has_credentials().unwrap());

        store
            .set(TokenKind::Access, "a-1", TokenKind::Access.ttl())
            .unwrap();
        assert_eq!(store.access_token().unwrap().unwrap().as_str(), "a-1");
        assert!(store.refresh_token().unwrap().is_none());
        assert!(store.has_credentials().unwrap());

        store.clear().unwrap();
        assert!(store.get(TokenKind::Access).unwrap().is_none());
    }

    #[test]
    fn expired_entries_read_as_absent() {
        let store = MemoryStore::new();
        store
            .set(TokenKind::Refresh, "r-1", Duration::ZERO)
            .unwrap();
        assert!(store.get(TokenKind::Refresh).unwrap().is_none());
    }
}
