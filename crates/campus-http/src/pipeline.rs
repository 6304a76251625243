//! Authenticated request pipeline.

use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, instrument};

use campus_core::{AuthError, AuthSession, Error, Result};

use crate::api::{ApiClient, ApiRequest, ApiResponse};
use crate::coordinator::RefreshCoordinator;

/// Sends requests with the current access token attached.
///
/// A 401 response triggers one token refresh (shared with any concurrent
/// callers) followed by exactly one retry. The retried response is returned
/// whatever its status; the pipeline never refreshes twice for one request.
#[derive(Clone)]
pub struct RequestPipeline {
    api: ApiClient,
    session: AuthSession,
    coordinator: Arc<RefreshCoordinator>,
}

impl RequestPipeline {
    pub fn new(api: ApiClient, session: AuthSession, coordinator: Arc<RefreshCoordinator>) -> Self {
        Self {
            api,
            session,
            coordinator,
        }
    }

    /// Send a request, refreshing and retrying once on 401.
    ///
    /// # Errors
    ///
    /// Transport failures are returned as-is and never trigger a refresh.
    /// If the refresh token is rejected, [`AuthError::SessionExpired`] is
    /// returned and the session has been ended. A 401 for a request sent
    /// before a logout or a new login is never retried: it fails with
    /// [`ExpiryReason::SessionReplaced`](campus_core::ExpiryReason).
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.send_with(|| Ok(request.clone())).await
    }

    /// Like [`send`](Self::send), but builds the request afresh for each
    /// attempt, so a body that quotes stored credentials picks up refreshed
    /// ones on the retry.
    #[instrument(skip_all)]
    pub async fn send_with<F>(&self, build: F) -> Result<ApiResponse>
    where
        F: Fn() -> Result<ApiRequest>,
    {
        let request = build()?;
        let (epoch, token) = self.session.token_snapshot()?;
        debug!(method = %request.method, path = %request.path, epoch, "Sending");
        let response = self.api.execute(&request, token.as_ref()).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        debug!("Access token rejected; refreshing");
        let fresh = self
            .coordinator
            .refresh_after(epoch, token.as_ref())
            .await
            .map_err(|e| match e {
                Error::Auth(AuthError::RefreshFailed(reason)) => {
                    Error::Auth(AuthError::SessionExpired(reason))
                }
                other => other,
            })?;

        debug!("Retrying with refreshed token");
        self.api.execute(&build()?, Some(&fresh)).await
    }

    /// GET `path` and decode a successful JSON response.
    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        self.send(&ApiRequest::get(path)).await?.into_json()
    }

    /// POST a JSON body to `path` and decode a successful JSON response.
    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = ApiRequest::post(path).json(body)?;
        self.send(&request).await?.into_json()
    }

    /// PATCH a JSON body to `path` and decode a successful JSON response.
    pub async fn patch_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = ApiRequest::patch(path).json(body)?;
        self.send(&request).await?.into_json()
    }

    /// DELETE `path`, discarding any response body.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(&ApiRequest::delete(path)).await?.into_unit()
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("api", self.api.api_url())
            .field("session", &self.session)
            .finish()
    }
}
