//! The client facade.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use campus_core::error::ProtocolError;
use campus_core::{
    AuthError, AuthSession, CredentialStore, Credentials, Identity, IdentityPatch,
    Registration, Result, SessionState,
};

use crate::api::endpoints::{
    ACHIEVEMENTS, AuthResponse, CHANGE_PASSWORD, ChangePasswordRequest, LOGIN, LOGOUT,
    LoginRequest, LogoutRequest, PROFILE, REGISTER, STATS,
};
use crate::api::{ApiClient, ApiRequest, ApiResponse};
use crate::bootstrap::SessionBootstrapper;
use crate::config::ClientConfig;
use crate::coordinator::RefreshCoordinator;
use crate::pipeline::RequestPipeline;

/// An authenticated client for the campus service.
///
/// All account operations go through this type. It owns the session state,
/// the refresh coordinator and the request pipeline, and is cheap to clone.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use campus_core::{ApiUrl, Credentials, MemoryStore};
/// use campus_http::{CampusClient, ClientConfig};
///
/// # async fn example() -> campus_core::Result<()> {
/// let api = ApiUrl::new("https://learn.example.com/api")?;
/// let client = CampusClient::new(ClientConfig::new(api), Arc::new(MemoryStore::new()))?;
///
/// let identity = client.login(&Credentials::new("ada@example.com", "hunter22")).await?;
/// println!("signed in as {}", identity.display_name());
///
/// let modules: serde_json::Value = client.pipeline().get_json("courses/modules/").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CampusClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    api: ApiClient,
    session: AuthSession,
    pipeline: RequestPipeline,
}

impl CampusClient {
    /// Create a client backed by `store`. The session starts `Anonymous`;
    /// call [`bootstrap`](Self::bootstrap) to restore persisted credentials.
    pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let api = ApiClient::new(&config)?;
        let session = AuthSession::new(store);
        let coordinator = Arc::new(RefreshCoordinator::new(
            session.clone(),
            Arc::new(api.clone()),
        ));
        let pipeline = RequestPipeline::new(api.clone(), session.clone(), coordinator);

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                api,
                session,
                pipeline,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &AuthSession {
        &self.inner.session
    }

    /// The pipeline for raw authenticated calls.
    pub fn pipeline(&self) -> &RequestPipeline {
        &self.inner.pipeline
    }

    /// Restore a session from persisted credentials.
    pub async fn bootstrap(&self) -> Result<SessionState> {
        SessionBootstrapper::new(self.inner.pipeline.clone())
            .run()
            .await
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`] if the service refuses them, either
    /// with a 401 or with a 400 carrying `non_field_errors`. Other 400s (a
    /// malformed email, a missing field) come back as protocol errors.
    #[instrument(skip(self, credentials), fields(email = %credentials.email()))]
    pub async fn login(&self, credentials: &Credentials) -> Result<Identity> {
        info!("Logging in");

        let request = ApiRequest::post(LOGIN).json(&LoginRequest {
            email: credentials.email(),
            password: credentials.password(),
        })?;
        let response = self.inner.api.execute(&request, None).await?;
        if credentials_refused(&response) {
            return Err(AuthError::InvalidCredentials.into());
        }

        let auth: AuthResponse = response.into_json()?;
        self.inner.session.establish(&auth.tokens, auth.user.clone())?;
        Ok(auth.user)
    }

    /// Create an account and sign in as it.
    ///
    /// Validation failures come back as a protocol error whose
    /// [`field_errors`](campus_core::error::ProtocolError::field_errors)
    /// list what the service objected to.
    #[instrument(skip(self, registration), fields(email = %registration.email, username = %registration.username))]
    pub async fn register(&self, registration: &Registration) -> Result<Identity> {
        info!("Registering account");

        let request = ApiRequest::post(REGISTER).json(registration)?;
        let response = self.inner.api.execute(&request, None).await?;
        if response.is_unauthorized() {
            return Err(AuthError::InvalidCredentials.into());
        }

        let auth: AuthResponse = response.into_json()?;
        self.inner.session.establish(&auth.tokens, auth.user.clone())?;
        Ok(auth.user)
    }

    /// Sign out.
    ///
    /// The service is told to revoke the refresh token on a best-effort
    /// basis, bounded by the configured logout timeout. The call goes
    /// through the pipeline, so an expired access token is refreshed first.
    /// Local state and storage are cleared whatever the outcome.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let session = &self.inner.session;
        match session.refresh_token() {
            Ok(Some(_)) => self.revoke().await,
            Ok(None) => debug!("No refresh token to revoke"),
            Err(e) => warn!(error = %e, "Could not read refresh token"),
        }

        session.end();
    }

    async fn revoke(&self) {
        let session = &self.inner.session;
        // Rebuilt per attempt: a refresh may rotate the refresh token.
        let build = || {
            let refresh = session
                .refresh_token()?
                .ok_or(AuthError::NotAuthenticated)?;
            ApiRequest::post(LOGOUT).json(&LogoutRequest {
                refresh_token: refresh.as_str(),
            })
        };

        let timeout = self.inner.config.logout_timeout;
        match tokio::time::timeout(timeout, self.inner.pipeline.send_with(build)).await {
            Ok(Ok(response)) if response.is_success() => debug!("Refresh token revoked"),
            Ok(Ok(response)) => warn!(status = response.status(), "Remote logout refused"),
            Ok(Err(e)) => warn!(error = %e, "Remote logout failed"),
            Err(_) => warn!(?timeout, "Remote logout timed out"),
        }
    }

    /// Force a token refresh, joining one already in flight.
    pub async fn refresh(&self) -> Result<()> {
        self.inner.pipeline.coordinator().refresh().await?;
        Ok(())
    }

    /// Fetch the signed-in user's profile from the service.
    ///
    /// When the session is authenticated, the cached identity is updated
    /// with the result.
    #[instrument(skip(self))]
    pub async fn fetch_profile(&self) -> Result<Identity> {
        self.ensure_credentials()?;
        let identity: Identity = self.inner.pipeline.get_json(PROFILE).await?;
        self.merge(identity)
    }

    /// Update profile fields and merge the server's result into the
    /// session. Unset fields in `patch` are left alone.
    #[instrument(skip(self, patch))]
    pub async fn update_profile(&self, patch: &IdentityPatch) -> Result<Identity> {
        self.ensure_credentials()?;
        let identity: Identity = self.inner.pipeline.patch_json(PROFILE, patch).await?;
        info!("Profile updated");
        self.merge(identity)
    }

    #[instrument(skip_all)]
    pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        self.ensure_credentials()?;
        let request = ApiRequest::post(CHANGE_PASSWORD).json(&ChangePasswordRequest {
            old_password,
            new_password,
            new_password2: new_password,
        })?;
        self.inner.pipeline.send(&request).await?.into_unit()?;
        info!("Password changed");
        Ok(())
    }

    /// Learning statistics for the signed-in user.
    pub async fn stats(&self) -> Result<Value> {
        self.ensure_credentials()?;
        self.inner.pipeline.get_json(STATS).await
    }

    /// Achievements unlocked by the signed-in user.
    pub async fn achievements(&self) -> Result<Value> {
        self.ensure_credentials()?;
        self.inner.pipeline.get_json(ACHIEVEMENTS).await
    }

    fn ensure_credentials(&self) -> Result<()> {
        let session = &self.inner.session;
        if session.access_token()?.is_none() && session.refresh_token()?.is_none() {
            return Err(AuthError::NotAuthenticated.into());
        }
        Ok(())
    }

    /// The service's copy of the profile is authoritative: it replaces the
    /// cached identity outright, so cleared fields stay cleared.
    fn merge(&self, identity: Identity) -> Result<Identity> {
        if self.inner.session.is_authenticated() {
            self.inner.session.replace_identity(identity)
        } else {
            Ok(identity)
        }
    }
}

/// Whether a login response means the email or password was wrong.
///
/// The service reports bad credentials as a 400 with `non_field_errors`
/// rather than a 401.
fn credentials_refused(response: &ApiResponse) -> bool {
    match response.status() {
        401 => true,
        400 => ProtocolError::new(400, serde_json::from_str(response.text()).ok())
            .field_errors()
            .iter()
            .any(|(field, _)| field == "non_field_errors"),
        _ => false,
    }
}

impl std::fmt::Debug for CampusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampusClient")
            .field("api", &self.inner.config.api_url)
            .field("session", &self.inner.session)
            .finish()
    }
}
