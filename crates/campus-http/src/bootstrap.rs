//! Startup validation of persisted credentials.

use tracing::{info, instrument, warn};

use campus_core::{AuthSession, Error, Identity, Result, SessionState};

use crate::api::endpoints::PROFILE;
use crate::pipeline::RequestPipeline;

/// Restores a session from the credential store at process start.
#[derive(Debug, Clone)]
pub struct SessionBootstrapper {
    pipeline: RequestPipeline,
}

impl SessionBootstrapper {
    pub fn new(pipeline: RequestPipeline) -> Self {
        Self { pipeline }
    }

    /// Validate persisted credentials by fetching the profile.
    ///
    /// Does nothing unless the session is `Anonymous` and the store holds a
    /// token. On success the session becomes `Authenticated`. If the
    /// service refuses the credentials (even after one refresh) the store is
    /// cleared and the session returns to `Anonymous`.
    ///
    /// # Errors
    ///
    /// Transport failures and server errors are returned after the session
    /// has gone back to `Anonymous`; the stored tokens are kept so a later
    /// start can try again.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<SessionState> {
        let session = self.pipeline.session();
        if !session.begin_bootstrap()? {
            return Ok(session.state());
        }

        match self.pipeline.get_json::<Identity>(PROFILE).await {
            Ok(identity) => {
                if !session.finish_bootstrap(identity) {
                    info!("Session changed while bootstrapping; keeping it");
                }
            }
            Err(e) if keeps_credentials(&e) => {
                warn!(error = %e, "Could not reach the service to restore session");
                session.abandon_bootstrap(false)?;
                return Err(e);
            }
            Err(e) => {
                info!(error = %e, "Persisted credentials rejected");
                session.abandon_bootstrap(true)?;
            }
        }
        Ok(session.state())
    }

    pub fn session(&self) -> &AuthSession {
        self.pipeline.session()
    }
}

/// Failures that say nothing about whether the credentials are valid.
fn keeps_credentials(error: &Error) -> bool {
    match error {
        Error::Transport(_) | Error::Storage(_) => true,
        Error::Protocol(e) => e.status >= 500,
        _ => false,
    }
}
