//! In-memory session state machine.
//!
//! [`AuthSession`] tracks whether a user identity is established and is the
//! only writer of the credential store. Every store write and the state
//! transition it implies happen under one lock, so no observer can see an
//! authenticated state without the matching tokens in storage.
//!
//! The session also carries an *epoch*: a counter bumped whenever the
//! credentials are replaced or discarded (login, logout, expiry). Work that
//! started under an older epoch, such as an in-flight token refresh, must not
//! write its result back.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::error::{AuthError, ExpiryReason};
use crate::identity::{Identity, IdentityPatch};
use crate::tokens::{AccessToken, CredentialPair, RefreshToken, TokenKind};
use crate::traits::CredentialStore;
use crate::Result;

/// Capacity of the session event channel.
const EVENT_CAPACITY: usize = 32;

/// Where the session currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No identity is established.
    Anonymous,
    /// Persisted credentials are being validated at startup.
    Bootstrapping,
    /// A user is signed in.
    Authenticated(Identity),
    /// The session just ended because its tokens could not be refreshed.
    /// Always collapses to `Anonymous`.
    Expired(ExpiryReason),
}

impl SessionState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }
}

/// Lifecycle notifications for UI collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Login or registration succeeded.
    LoggedIn,
    /// Persisted credentials were validated at startup.
    Restored,
    /// The access token was refreshed; the identity is unchanged.
    Refreshed,
    /// The cached identity was patched.
    IdentityUpdated,
    /// The user logged out.
    LoggedOut,
    /// The session ended because refresh was impossible.
    Expired(ExpiryReason),
}

/// Shared handle to the session state.
///
/// Cheap to clone; all clones observe and drive the same session.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    store: Arc<dyn CredentialStore>,
    epoch: Mutex<u64>,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl AuthSession {
    /// Create an anonymous session backed by `store`.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let (state, _) = watch::channel(SessionState::Anonymous);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(SessionInner {
                store,
                epoch: Mutex::new(0),
                state,
                events,
            }),
        }
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Returns the signed-in identity, if any.
    pub fn identity(&self) -> Option<Identity> {
        self.inner.state.borrow().identity().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(*self.inner.state.borrow(), SessionState::Authenticated(_))
    }

    /// Returns true while startup validation is running.
    pub fn is_loading(&self) -> bool {
        matches!(*self.inner.state.borrow(), SessionState::Bootstrapping)
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Receive lifecycle events, including the transient expiry signal.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// The current credential epoch.
    pub fn epoch(&self) -> u64 {
        *self.lock()
    }

    /// Read the stored access token.
    pub fn access_token(&self) -> Result<Option<AccessToken>> {
        self.inner.store.access_token()
    }

    /// Read the stored refresh token.
    pub fn refresh_token(&self) -> Result<Option<RefreshToken>> {
        self.inner.store.refresh_token()
    }

    /// Read the epoch and the stored access token together.
    ///
    /// The token is the one in force for that epoch; a request sent with it
    /// belongs to that epoch.
    pub fn token_snapshot(&self) -> Result<(u64, Option<AccessToken>)> {
        let epoch = self.lock();
        let token = self.inner.store.access_token()?;
        Ok((*epoch, token))
    }

    /// Enter `Bootstrapping` if the session is anonymous and the store holds
    /// any token. Returns whether the transition happened.
    pub fn begin_bootstrap(&self) -> Result<bool> {
        let _epoch = self.lock();
        if !matches!(*self.inner.state.borrow(), SessionState::Anonymous) {
            return Ok(false);
        }
        if !self.inner.store.has_credentials()? {
            debug!("No persisted credentials");
            return Ok(false);
        }
        self.publish(SessionState::Bootstrapping);
        debug!("Bootstrapping session from persisted credentials");
        Ok(true)
    }

    /// Complete startup validation with the fetched identity.
    ///
    /// Returns false, changing nothing, if the session left `Bootstrapping`
    /// in the meantime (a logout or login won the race).
    pub fn finish_bootstrap(&self, identity: Identity) -> bool {
        let _epoch = self.lock();
        if !matches!(*self.inner.state.borrow(), SessionState::Bootstrapping) {
            return false;
        }
        info!(user = %identity.username, "Session restored");
        self.publish(SessionState::Authenticated(identity));
        self.emit(SessionEvent::Restored);
        true
    }

    /// Leave `Bootstrapping` for `Anonymous`, optionally discarding the
    /// persisted credentials.
    ///
    /// The state always leaves `Bootstrapping`, even when clearing the store
    /// fails; the store error is returned afterwards.
    pub fn abandon_bootstrap(&self, clear_credentials: bool) -> Result<()> {
        let mut epoch = self.lock();
        if !matches!(*self.inner.state.borrow(), SessionState::Bootstrapping) {
            return Ok(());
        }
        let cleared = if clear_credentials {
            *epoch += 1;
            self.inner.store.clear()
        } else {
            Ok(())
        };
        info!(cleared = clear_credentials, "Session bootstrap abandoned");
        self.publish(SessionState::Anonymous);
        cleared
    }

    /// Install a fresh credential pair and identity (login or registration).
    ///
    /// The tokens are written before the `Authenticated` state is published.
    pub fn establish(&self, pair: &CredentialPair, identity: Identity) -> Result<()> {
        let mut epoch = self.lock();
        *epoch += 1;
        let store = &self.inner.store;
        store.set(
            TokenKind::Access,
            pair.access.as_str(),
            TokenKind::Access.ttl(),
        )?;
        store.set(
            TokenKind::Refresh,
            pair.refresh.as_str(),
            TokenKind::Refresh.ttl(),
        )?;
        info!(user = %identity.username, epoch = *epoch, "Session established");
        self.publish(SessionState::Authenticated(identity));
        self.emit(SessionEvent::LoggedIn);
        Ok(())
    }

    /// Persist refreshed tokens if the session is still on `epoch`.
    ///
    /// Returns false, writing nothing, when the epoch moved on.
    pub fn commit_refresh(
        &self,
        epoch: u64,
        access: &AccessToken,
        refresh: Option<&RefreshToken>,
    ) -> Result<bool> {
        let current = self.lock();
        if *current != epoch {
            debug!(epoch, current = *current, "Discarding refresh from an old epoch");
            return Ok(false);
        }
        let store = &self.inner.store;
        store.set(TokenKind::Access, access.as_str(), TokenKind::Access.ttl())?;
        if let Some(refresh) = refresh {
            store.set(
                TokenKind::Refresh,
                refresh.as_str(),
                TokenKind::Refresh.ttl(),
            )?;
        }
        debug!(rotated = refresh.is_some(), "Refreshed tokens stored");
        self.emit(SessionEvent::Refreshed);
        Ok(true)
    }

    /// End the session because refresh failed, if it is still on `epoch`.
    ///
    /// Clears the store and, from `Authenticated`, passes through `Expired`
    /// to `Anonymous`. A `Bootstrapping` state is left for the bootstrapper
    /// to resolve. Returns whether anything happened.
    pub fn expire(&self, epoch: u64, reason: ExpiryReason) -> bool {
        let mut current = self.lock();
        if *current != epoch {
            return false;
        }
        *current += 1;
        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "Failed to clear credentials on expiry");
        }
        if self.is_authenticated() {
            info!(%reason, "Session expired");
            self.publish(SessionState::Expired(reason));
            self.emit(SessionEvent::Expired(reason));
            self.publish(SessionState::Anonymous);
        }
        true
    }

    /// End the session locally (logout). Never fails.
    pub fn end(&self) {
        let mut epoch = self.lock();
        *epoch += 1;
        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "Failed to clear credentials on logout");
        }
        let was_authenticated = self.is_authenticated();
        self.publish(SessionState::Anonymous);
        if was_authenticated {
            info!("Logged out");
            self.emit(SessionEvent::LoggedOut);
        }
    }

    /// Merge a patch into the signed-in identity and return the result.
    pub fn update_identity(&self, patch: &IdentityPatch) -> Result<Identity> {
        let _epoch = self.lock();
        let mut merged = None;
        self.inner.state.send_if_modified(|state| match state {
            SessionState::Authenticated(identity) => {
                identity.apply(patch);
                merged = Some(identity.clone());
                true
            }
            _ => false,
        });
        let identity = merged.ok_or(AuthError::NotAuthenticated)?;
        self.emit(SessionEvent::IdentityUpdated);
        Ok(identity)
    }

    /// Replace the signed-in identity with one fetched from the service.
    ///
    /// Every field is taken from `identity`, including ones it leaves empty.
    pub fn replace_identity(&self, identity: Identity) -> Result<Identity> {
        let _epoch = self.lock();
        let replaced = self.inner.state.send_if_modified(|state| match state {
            SessionState::Authenticated(current) => {
                *current = identity.clone();
                true
            }
            _ => false,
        });
        if !replaced {
            return Err(AuthError::NotAuthenticated.into());
        }
        self.emit(SessionEvent::IdentityUpdated);
        Ok(identity)
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        self.inner
            .epoch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: SessionState) {
        self.inner.state.send_replace(state);
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("state", &*self.inner.state.borrow())
            .field("tokens", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn pair(access: &str, refresh: &str) -> CredentialPair {
        CredentialPair::new(AccessToken::new(access), RefreshToken::new(refresh))
    }

    fn session_with_store() -> (AuthSession, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (AuthSession::new(store.clone()), store)
    }

    #[test]
    fn starts_anonymous() {
        let (session, _) = session_with_store();
        assert_eq!(session.state(), SessionState::Anonymous);
        assert!(session.identity().is_none());
        assert_eq!(session.epoch(), 0);
    }

    #[test]
    fn establish_writes_store_before_publishing() {
        let (session, store) = session_with_store();
        let mut watcher = session.subscribe();

        session
            .establish(&pair("a-1", "r-1"), Identity::new(1, "ada"))
            .unwrap();

        assert!(watcher.has_changed().unwrap());
        let state = watcher.borrow_and_update().clone();
        assert!(matches!(state, SessionState::Authenticated(ref id) if id.username == "ada"));
        assert_eq!(store.access_token().unwrap().unwrap().as_str(), "a-1");
        assert_eq!(store.refresh_token().unwrap().unwrap().as_str(), "r-1");
        assert_eq!(session.epoch(), 1);
    }

    #[test]
    fn refresh_commit_is_epoch_guarded() {
        let (session, store) = session_with_store();
        session
            .establish(&pair("a-1", "r-1"), Identity::new(1, "ada"))
            .unwrap();
        let epoch = session.epoch();

        assert!(
            session
                .commit_refresh(epoch, &AccessToken::new("a-2"), None)
                .unwrap()
        );
        assert_eq!(store.access_token().unwrap().unwrap().as_str(), "a-2");
        assert_eq!(store.refresh_token().unwrap().unwrap().as_str(), "r-1");

        session.end();
        assert!(
            !session
                .commit_refresh(epoch, &AccessToken::new("a-3"), Some(&RefreshToken::new("r-3")))
                .unwrap()
        );
        assert!(!store.has_credentials().unwrap());
    }

    #[test]
    fn expire_passes_through_expired_and_clears() {
        let (session, store) = session_with_store();
        session
            .establish(&pair("a-1", "r-1"), Identity::new(1, "ada"))
            .unwrap();
        let mut events = session.events();
        let epoch = session.epoch();

        assert!(session.expire(epoch, ExpiryReason::Expired));
        assert!(!session.expire(epoch, ExpiryReason::Expired));

        assert_eq!(session.state(), SessionState::Anonymous);
        assert!(!store.has_credentials().unwrap());
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Expired(ExpiryReason::Expired)
        );
    }

    #[test]
    fn logout_always_ends_anonymous() {
        let (session, store) = session_with_store();
        session
            .establish(&pair("a-1", "r-1"), Identity::new(1, "ada"))
            .unwrap();
        let mut events = session.events();

        session.end();

        assert_eq!(session.state(), SessionState::Anonymous);
        assert!(!store.has_credentials().unwrap());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::LoggedOut);
    }

    #[test]
    fn bootstrap_requires_persisted_tokens() {
        let (session, store) = session_with_store();
        assert!(!session.begin_bootstrap().unwrap());

        store
            .set(TokenKind::Refresh, "r-1", TokenKind::Refresh.ttl())
            .unwrap();
        assert!(session.begin_bootstrap().unwrap());
        assert!(session.is_loading());
        assert!(!session.begin_bootstrap().unwrap());

        assert!(session.finish_bootstrap(Identity::new(3, "grace")));
        assert_eq!(session.identity().unwrap().username, "grace");
    }

    #[test]
    fn abandoned_bootstrap_clears_store() {
        let (session, store) = session_with_store();
        store
            .set(TokenKind::Access, "a-1", TokenKind::Access.ttl())
            .unwrap();
        assert!(session.begin_bootstrap().unwrap());

        session.abandon_bootstrap(true).unwrap();

        assert_eq!(session.state(), SessionState::Anonymous);
        assert!(!store.has_credentials().unwrap());
    }

    #[test]
    fn bootstrap_result_ignored_after_logout() {
        let (session, store) = session_with_store();
        store
            .set(TokenKind::Access, "a-1", TokenKind::Access.ttl())
            .unwrap();
        assert!(session.begin_bootstrap().unwrap());

        session.end();

        assert!(!session.finish_bootstrap(Identity::new(3, "grace")));
        assert_eq!(session.state(), SessionState::Anonymous);
    }

    #[test]
    fn identity_patch_merges() {
        let (session, _) = session_with_store();
        let mut identity = Identity::new(1, "a");
        identity.level = 2;
        session.establish(&pair("a-1", "r-1"), identity).unwrap();

        let merged = session
            .update_identity(&IdentityPatch {
                level: Some(3),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(merged.username, "a");
        assert_eq!(merged.level, 3);
        assert_eq!(session.identity().unwrap(), merged);
    }

    #[test]
    fn replaced_identity_drops_cleared_fields() {
        let (session, _) = session_with_store();
        let mut identity = Identity::new(1, "a");
        identity.avatar = Some("/media/avatars/a.png".to_string());
        session.establish(&pair("a-1", "r-1"), identity).unwrap();
        let mut events = session.events();

        let fetched = Identity::new(1, "a");
        let replaced = session.replace_identity(fetched.clone()).unwrap();

        assert_eq!(replaced.avatar, None);
        assert_eq!(session.identity().unwrap(), fetched);
        assert_eq!(events.try_recv().unwrap(), SessionEvent::IdentityUpdated);
    }

    #[test]
    fn token_snapshot_tracks_epoch() {
        let (session, _) = session_with_store();
        assert_eq!(session.token_snapshot().unwrap(), (0, None));

        session.establish(&pair("a-1", "r-1"), Identity::new(1, "a")).unwrap();
        let (epoch, token) = session.token_snapshot().unwrap();
        assert_eq!(epoch, 1);
        assert_eq!(token.unwrap().as_str(), "a-1");

        session.end();
        assert_eq!(session.token_snapshot().unwrap(), (2, None));
    }

    #[test]
    fn identity_patch_requires_authentication() {
        let (session, _) = session_with_store();
        let err = session.update_identity(&IdentityPatch::default()).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Auth(AuthError::NotAuthenticated)
        ));
    }
}
