//! Filesystem storage for session credentials.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use campus_core::error::StorageError;
use campus_core::{CredentialStore, Result, TokenKind};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// On-disk document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(default)]
    entries: BTreeMap<String, StoredEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    token: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A [`CredentialStore`] persisted as a JSON file.
///
/// Each operation takes an exclusive lock on a sibling `.lock` file and
/// replaces the document atomically (write to a temporary file, then
/// rename), so concurrent writers never leave a partial document behind.
/// On Unix the file is readable only by its owner.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store at the given file path. The file is created lazily.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Get the credential file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }

    /// Run `f` while holding the exclusive store lock.
    fn with_lock<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(StorageError::from)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(StorageError::from)?;

        lock_file.lock_exclusive().map_err(StorageError::from)?;
        let result = f();
        lock_file.unlock().map_err(StorageError::from)?;
        result
    }

    fn read(&self) -> Result<StoredCredentials> {
        if !self.path.exists() {
            return Ok(StoredCredentials::default());
        }
        let json = fs::read_to_string(&self.path).map_err(StorageError::from)?;
        if json.trim().is_empty() {
            return Ok(StoredCredentials::default());
        }
        let stored = serde_json::from_str(&json).map_err(|e| StorageError::Corrupt {
            message: e.to_string(),
        })?;
        Ok(stored)
    }

    fn write(&self, stored: &StoredCredentials) -> Result<()> {
        let json = serde_json::to_string_pretty(stored).map_err(|e| StorageError::Corrupt {
            message: e.to_string(),
        })?;

        let temp = self.temp_path();
        let mut file = File::create(&temp).map_err(StorageError::from)?;

        // Set restrictive permissions (Unix only)
        #[cfg(unix)]
        {
            let mut perms = file.metadata().map_err(StorageError::from)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&temp, perms).map_err(StorageError::from)?;
        }

        file.write_all(json.as_bytes()).map_err(StorageError::from)?;
        file.sync_all().map_err(StorageError::from)?;
        drop(file);

        fs::rename(&temp, &self.path).map_err(StorageError::from)?;
        Ok(())
    }
}

impl CredentialStore for FileStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn get(&self, kind: TokenKind) -> Result<Option<String>> {
        self.with_lock(|| {
            let stored = self.read()?;
            let entry = stored
                .entries
                .get(kind.key())
                .filter(|e| !e.is_expired(Utc::now()));
            trace!(present = entry.is_some(), "Read credential");
            Ok(entry.map(|e| e.token.clone()))
        })
    }

    #[instrument(skip(self, token), fields(path = %self.path.display()))]
    fn set(&self, kind: TokenKind, token: &str, ttl: Duration) -> Result<()> {
        self.with_lock(|| {
            let mut stored = self.read().unwrap_or_else(|e| {
                debug!(error = %e, "Replacing unreadable credential file");
                StoredCredentials::default()
            });
            let expires_at = chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|ttl| Utc::now().checked_add_signed(ttl));
            let now = Utc::now();
            stored.entries.retain(|_, e| !e.is_expired(now));
            stored.entries.insert(
                kind.key().to_string(),
                StoredEntry {
                    token: token.to_string(),
                    expires_at,
                },
            );
            self.write(&stored)?;
            debug!("Stored credential");
            Ok(())
        })
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn clear(&self) -> Result<()> {
        self.with_lock(|| {
            if self.path.exists() {
                fs::remove_file(&self.path).map_err(StorageError::from)?;
            }
            debug!("Cleared credentials");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> FileStore {
        FileStore::new(dir.path().join("nested").join("credentials.json"))
    }

    #[test]
    fn empty_store_has_nothing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.get(TokenKind::Access).unwrap().is_none());
        assert!(!store.has_credentials().unwrap());
    }

    #[test]
    fn persists_across_instances() {
        let dir = TempDir::new().unwrap();
        store_in(&dir)
            .set(TokenKind::Access, "a-1", TokenKind::Access.ttl())
            .unwrap();
        store_in(&dir)
            .set(TokenKind::Refresh, "r-1", TokenKind::Refresh.ttl())
            .unwrap();

        let reopened = store_in(&dir);
        assert_eq!(reopened.access_token().unwrap().unwrap().as_str(), "a-1");
        assert_eq!(reopened.refresh_token().unwrap().unwrap().as_str(), "r-1");
    }

    #[test]
    fn clear_removes_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store
            .set(TokenKind::Access, "a-1", TokenKind::Access.ttl())
            .unwrap();
        assert!(store.path().exists());

        store.clear().unwrap();
        assert!(!store.path().exists());
        assert!(store.get(TokenKind::Access).unwrap().is_none());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn expired_tokens_are_absent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store
            .set(TokenKind::Access, "a-1", Duration::ZERO)
            .unwrap();
        store
            .set(TokenKind::Refresh, "r-1", TokenKind::Refresh.ttl())
            .unwrap();
        assert!(store.get(TokenKind::Access).unwrap().is_none());
        assert!(store.get(TokenKind::Refresh).unwrap().is_some());
    }

    #[test]
    fn corrupt_file_is_reported_and_overwritten() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{not json").unwrap();

        let err = store.get(TokenKind::Access).unwrap_err();
        assert!(err.to_string().contains("corrupt"));

        store
            .set(TokenKind::Access, "a-1", TokenKind::Access.ttl())
            .unwrap();
        assert_eq!(store.get(TokenKind::Access).unwrap().unwrap(), "a-1");
    }

    #[cfg(unix)]
    #[test]
    fn file_is_owner_only() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store
            .set(TokenKind::Access, "a-1", TokenKind::Access.ttl())
            .unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn concurrent_writers_keep_document_valid() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store_in(&dir));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let kind = if i % 2 == 0 {
                        TokenKind::Access
                    } else {
                        TokenKind::Refresh
                    };
                    store
                        .set(kind, &format!("token-{}", i), kind.ttl())
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let access = store.get(TokenKind::Access).unwrap().unwrap();
        let refresh = store.get(TokenKind::Refresh).unwrap().unwrap();
        assert!(access.starts_with("token-"));
        assert!(refresh.starts_with("token-"));
    }
}
