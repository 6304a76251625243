//! Single-flight token refresh.
//!
//! Several requests can discover an expired access token at once. The
//! [`RefreshCoordinator`] makes sure only one of them calls the refresh
//! endpoint: the first caller starts a refresh and parks a shared future in
//! the coordinator's slot, later callers clone and await that same future.
//! The future writes the new tokens to the store before it resolves, and
//! empties the slot on the way out so the next expiry starts a new cycle.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use campus_core::error::ProtocolError;
use campus_core::{AccessToken, AuthError, AuthSession, Error, ExpiryReason, RefreshToken, Result};

use crate::api::endpoints::{RefreshRequest, RefreshResponse, TOKEN_REFRESH};
use crate::api::{ApiClient, ApiRequest, ApiResponse};

/// Tokens returned by a successful refresh.
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access: AccessToken,
    /// Present when the service rotated the refresh token.
    pub refresh: Option<RefreshToken>,
}

/// Exchanges a refresh token for new tokens.
///
/// Implementations call the refresh endpoint directly. A rejected refresh
/// token must be reported as [`AuthError::RefreshFailed`]; any other error is
/// treated as transient and leaves the session in place.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<RefreshedTokens>;
}

#[async_trait]
impl TokenRefresher for ApiClient {
    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<RefreshedTokens> {
        let request = ApiRequest::post(TOKEN_REFRESH).json(&RefreshRequest {
            refresh: refresh_token.as_str(),
        })?;

        let response = self.execute(&request, None).await?;
        match response.status() {
            400 | 401 | 403 => Err(AuthError::RefreshFailed(rejection_reason(&response)).into()),
            _ => {
                let body: RefreshResponse = response.into_json()?;
                Ok(RefreshedTokens {
                    access: AccessToken::new(body.access),
                    refresh: body.refresh.map(RefreshToken::new),
                })
            }
        }
    }
}

/// Classify a refusal from the refresh endpoint.
fn rejection_reason(response: &ApiResponse) -> ExpiryReason {
    let error = ProtocolError::new(response.status(), serde_json::from_str(response.text()).ok());
    let detail = error.detail.unwrap_or_default().to_lowercase();
    if detail.contains("blacklist") || detail.contains("revoked") {
        ExpiryReason::Revoked
    } else if detail.contains("expired") || error.code.as_deref() == Some("token_not_valid") {
        ExpiryReason::Expired
    } else {
        ExpiryReason::Rejected
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<AccessToken>>>;

#[derive(Default)]
struct Slot {
    next_id: u64,
    flight: Option<Flight>,
}

struct Flight {
    id: u64,
    epoch: u64,
    future: SharedRefresh,
}

/// What prompted a refresh.
#[derive(Clone, Copy)]
enum Trigger<'a> {
    /// Asked for explicitly; always refreshes.
    Explicit,
    /// The service rejected a request sent with `token` during `epoch`.
    Rejected {
        epoch: u64,
        token: Option<&'a AccessToken>,
    },
}

/// Ensures at most one refresh is in flight.
pub struct RefreshCoordinator {
    session: AuthSession,
    refresher: Arc<dyn TokenRefresher>,
    slot: Arc<Mutex<Slot>>,
}

impl RefreshCoordinator {
    pub fn new(session: AuthSession, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            session,
            refresher,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Refresh now, or join the refresh already in flight.
    ///
    /// # Errors
    ///
    /// [`AuthError::RefreshFailed`] if the refresh token was rejected (the
    /// session has then been expired and the store cleared), or if the
    /// session was replaced while the refresh ran. Transport and server
    /// errors pass through and leave the session untouched.
    pub async fn refresh(&self) -> Result<AccessToken> {
        self.acquire(Trigger::Explicit).await
    }

    /// Obtain a usable access token after `rejected`, sent during `epoch`,
    /// was refused by the service.
    ///
    /// If another flight in the same epoch already replaced the rejected
    /// token, the stored token is returned without a network call.
    ///
    /// # Errors
    ///
    /// [`AuthError::RefreshFailed`] with [`ExpiryReason::SessionReplaced`]
    /// if the session moved to another epoch (logout or a new login) since
    /// the request was sent. No token of the new session is handed out.
    pub async fn refresh_after(
        &self,
        epoch: u64,
        rejected: Option<&AccessToken>,
    ) -> Result<AccessToken> {
        self.acquire(Trigger::Rejected {
            epoch,
            token: rejected,
        })
        .await
    }

    /// Returns true while a refresh is outstanding.
    pub fn is_refreshing(&self) -> bool {
        lock(&self.slot).flight.is_some()
    }

    async fn acquire(&self, trigger: Trigger<'_>) -> Result<AccessToken> {
        let future = {
            let mut guard = lock(&self.slot);
            let slot = &mut *guard;
            let (current_epoch, current) = self.session.token_snapshot()?;

            let epoch = match trigger {
                Trigger::Explicit => current_epoch,
                Trigger::Rejected { epoch, .. } if epoch != current_epoch => {
                    debug!(epoch, current = current_epoch, "Rejected request predates the session");
                    return Err(AuthError::RefreshFailed(ExpiryReason::SessionReplaced).into());
                }
                Trigger::Rejected { epoch, .. } => epoch,
            };

            match slot.flight {
                Some(ref flight) if flight.epoch == epoch => {
                    debug!(flight = flight.id, "Joining in-flight refresh");
                    flight.future.clone()
                }
                _ => {
                    if let (Trigger::Rejected { token, .. }, Some(current)) = (trigger, current) {
                        if token != Some(&current) {
                            debug!("Access token already replaced");
                            return Ok(current);
                        }
                    }
                    slot.next_id += 1;
                    let id = slot.next_id;
                    let future = self.start(id, epoch);
                    slot.flight = Some(Flight {
                        id,
                        epoch,
                        future: future.clone(),
                    });
                    future
                }
            }
        };
        future.await
    }

    fn start(&self, id: u64, epoch: u64) -> SharedRefresh {
        let session = self.session.clone();
        let refresher = Arc::clone(&self.refresher);
        let slot = Arc::clone(&self.slot);

        async move {
            let outcome = run_refresh(&session, refresher.as_ref(), epoch).await;
            let mut slot = lock(&slot);
            if slot.flight.as_ref().is_some_and(|f| f.id == id) {
                slot.flight = None;
            }
            outcome
        }
        .instrument(info_span!("token_refresh", flight = id, epoch))
        .boxed()
        .shared()
    }
}

async fn run_refresh(
    session: &AuthSession,
    refresher: &dyn TokenRefresher,
    epoch: u64,
) -> Result<AccessToken> {
    let Some(refresh_token) = session.refresh_token()? else {
        warn!("No refresh token stored");
        session.expire(epoch, ExpiryReason::MissingRefreshToken);
        return Err(AuthError::RefreshFailed(ExpiryReason::MissingRefreshToken).into());
    };

    info!("Refreshing access token");
    match refresher.refresh(&refresh_token).await {
        Ok(tokens) => {
            if session.commit_refresh(epoch, &tokens.access, tokens.refresh.as_ref())? {
                debug!("Token refresh committed");
                Ok(tokens.access)
            } else {
                info!("Session changed during refresh; result discarded");
                Err(AuthError::RefreshFailed(ExpiryReason::SessionReplaced).into())
            }
        }
        Err(Error::Auth(AuthError::RefreshFailed(reason))) => {
            warn!(%reason, "Refresh token rejected");
            session.expire(epoch, reason);
            Err(AuthError::RefreshFailed(reason).into())
        }
        Err(e) => {
            warn!(error = %e, "Token refresh failed");
            Err(e)
        }
    }
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &self.is_refreshing())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use campus_core::error::TransportError;
    use campus_core::{CredentialPair, CredentialStore, Identity, MemoryStore, SessionState};
    use futures_util::future::join_all;
    use tokio::sync::Semaphore;

    /// Refresher that counts calls and holds each one until released.
    struct GatedRefresher {
        calls: AtomicUsize,
        gate: Semaphore,
        outcome: Result<RefreshedTokens>,
    }

    impl GatedRefresher {
        fn new(outcome: Result<RefreshedTokens>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Semaphore::new(0),
                outcome,
            })
        }

        fn open(outcome: Result<RefreshedTokens>) -> Arc<Self> {
            let refresher = Self::new(outcome);
            refresher.gate.add_permits(Semaphore::MAX_PERMITS);
            refresher
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRefresher for GatedRefresher {
        async fn refresh(&self, _refresh_token: &RefreshToken) -> Result<RefreshedTokens> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await;
            self.outcome.clone()
        }
    }

    fn refreshed(access: &str, refresh: Option<&str>) -> Result<RefreshedTokens> {
        Ok(RefreshedTokens {
            access: AccessToken::new(access),
            refresh: refresh.map(RefreshToken::new),
        })
    }

    fn signed_in() -> (AuthSession, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let session = AuthSession::new(store.clone());
        session
            .establish(
                &CredentialPair::new(AccessToken::new("old"), RefreshToken::new("r-1")),
                Identity::new(1, "ada"),
            )
            .unwrap();
        (session, store)
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let (session, store) = signed_in();
        let refresher = GatedRefresher::new(refreshed("new", None));
        let coordinator = RefreshCoordinator::new(session.clone(), refresher.clone());
        let stale = AccessToken::new("old");
        let epoch = session.epoch();

        let waiters = join_all((0..5).map(|_| coordinator.refresh_after(epoch, Some(&stale))));
        let release = async {
            tokio::task::yield_now().await;
            assert!(coordinator.is_refreshing());
            refresher.gate.add_permits(1);
        };
        let (results, ()) = tokio::join!(waiters, release);

        assert_eq!(refresher.calls(), 1);
        for result in results {
            assert_eq!(result.unwrap().as_str(), "new");
        }
        assert_eq!(store.access_token().unwrap().unwrap().as_str(), "new");
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn late_caller_with_stale_token_reuses_result() {
        let (session, _store) = signed_in();
        let refresher = GatedRefresher::open(refreshed("new", None));
        let coordinator = RefreshCoordinator::new(session.clone(), refresher.clone());
        let stale = AccessToken::new("old");
        let epoch = session.epoch();

        coordinator.refresh_after(epoch, Some(&stale)).await.unwrap();
        let again = coordinator.refresh_after(epoch, Some(&stale)).await.unwrap();

        assert_eq!(again.as_str(), "new");
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn slot_resets_after_each_cycle() {
        let (session, _store) = signed_in();
        let refresher = GatedRefresher::open(refreshed("new", None));
        let coordinator = RefreshCoordinator::new(session, refresher.clone());

        coordinator.refresh().await.unwrap();
        coordinator.refresh().await.unwrap();

        assert_eq!(refresher.calls(), 2);
    }

    #[tokio::test]
    async fn rotated_refresh_token_is_stored() {
        let (session, store) = signed_in();
        let refresher = GatedRefresher::open(refreshed("new", Some("r-2")));
        let coordinator = RefreshCoordinator::new(session, refresher);

        coordinator.refresh().await.unwrap();

        assert_eq!(store.refresh_token().unwrap().unwrap().as_str(), "r-2");
    }

    #[tokio::test]
    async fn rejection_is_broadcast_and_expires_session() {
        let (session, store) = signed_in();
        let refresher = GatedRefresher::new(Err(AuthError::RefreshFailed(ExpiryReason::Expired).into()));
        let coordinator = RefreshCoordinator::new(session.clone(), refresher.clone());
        let stale = AccessToken::new("old");
        let epoch = session.epoch();

        let waiters = join_all((0..3).map(|_| coordinator.refresh_after(epoch, Some(&stale))));
        let release = async {
            tokio::task::yield_now().await;
            refresher.gate.add_permits(1);
        };
        let (results, ()) = tokio::join!(waiters, release);

        assert_eq!(refresher.calls(), 1);
        for result in results {
            assert!(matches!(
                result,
                Err(Error::Auth(AuthError::RefreshFailed(ExpiryReason::Expired)))
            ));
        }
        assert_eq!(session.state(), SessionState::Anonymous);
        assert!(!store.has_credentials().unwrap());
    }

    #[tokio::test]
    async fn transient_failure_keeps_session() {
        let (session, store) = signed_in();
        let refresher = GatedRefresher::open(Err(TransportError::Timeout.into()));
        let coordinator = RefreshCoordinator::new(session.clone(), refresher);

        let err = coordinator.refresh().await.unwrap_err();

        assert!(err.is_transport());
        assert!(session.is_authenticated());
        assert_eq!(store.access_token().unwrap().unwrap().as_str(), "old");
    }

    #[tokio::test]
    async fn refresh_resolving_after_logout_is_discarded() {
        let (session, store) = signed_in();
        let refresher = GatedRefresher::new(refreshed("new", Some("r-2")));
        let coordinator = RefreshCoordinator::new(session.clone(), refresher.clone());

        let pending = coordinator.refresh();
        let logout = async {
            tokio::task::yield_now().await;
            session.end();
            refresher.gate.add_permits(1);
        };
        let (result, ()) = tokio::join!(pending, logout);

        assert!(matches!(
            result,
            Err(Error::Auth(AuthError::RefreshFailed(ExpiryReason::SessionReplaced)))
        ));
        assert!(!store.has_credentials().unwrap());
        assert_eq!(session.state(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn rejection_from_a_replaced_session_is_not_refreshed() {
        let (session, _store) = signed_in();
        let refresher = GatedRefresher::open(refreshed("new", None));
        let coordinator = RefreshCoordinator::new(session.clone(), refresher.clone());
        let stale = AccessToken::new("old");
        let epoch = session.epoch();

        session.end();
        session
            .establish(
                &CredentialPair::new(AccessToken::new("bob"), RefreshToken::new("bob-r")),
                Identity::new(2, "bob"),
            )
            .unwrap();

        let err = coordinator
            .refresh_after(epoch, Some(&stale))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Auth(AuthError::RefreshFailed(ExpiryReason::SessionReplaced))
        ));
        assert_eq!(refresher.calls(), 0);
        assert_eq!(session.access_token().unwrap().unwrap().as_str(), "bob");
    }

    #[tokio::test]
    async fn missing_refresh_token_fails_without_network() {
        let store = Arc::new(MemoryStore::new());
        let session = AuthSession::new(store);
        let refresher = GatedRefresher::open(refreshed("new", None));
        let coordinator = RefreshCoordinator::new(session, refresher.clone());

        let err = coordinator.refresh_after(0, None).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Auth(AuthError::RefreshFailed(ExpiryReason::MissingRefreshToken))
        ));
        assert_eq!(refresher.calls(), 0);
    }

    #[test]
    fn classifies_rejections() {
        let blacklisted = ApiResponse::new(
            401,
            r#"{"detail": "Token is blacklisted", "code": "token_not_valid"}"#,
        );
        assert_eq!(rejection_reason(&blacklisted), ExpiryReason::Revoked);

        let expired = ApiResponse::new(
            401,
            r#"{"detail": "Token is invalid or expired", "code": "token_not_valid"}"#,
        );
        assert_eq!(rejection_reason(&expired), ExpiryReason::Expired);

        let missing = ApiResponse::new(400, r#"{"refresh": ["This field is required."]}"#);
        assert_eq!(rejection_reason(&missing), ExpiryReason::Rejected);
    }
}
