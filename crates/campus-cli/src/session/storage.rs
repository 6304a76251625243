//! Building a client over the on-disk credential store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;

use campus_core::{ApiUrl, Identity, SessionState};
use campus_file::FileStore;
use campus_http::{CampusClient, ClientConfig};

use crate::cli::ConnectionArgs;

/// Resolve the credential store path.
fn store_path(args: &ConnectionArgs) -> Result<PathBuf> {
    if let Some(ref path) = args.store {
        return Ok(path.clone());
    }

    let dirs =
        ProjectDirs::from("", "", "campus").context("Could not determine data directory")?;
    Ok(dirs.data_dir().join("credentials.json"))
}

/// Build a client backed by the credential store. The session is not
/// restored yet.
pub fn open_client(args: &ConnectionArgs) -> Result<CampusClient> {
    let api = ApiUrl::new(&args.api_url).context("Invalid API URL")?;
    let config = ClientConfig::new(api)
        .with_request_timeout(Duration::from_secs(args.timeout))
        .with_user_agent(concat!("campus-cli/", env!("CAMPUS_VERSION")));

    let path = store_path(args)?;
    tracing::debug!(path = %path.display(), "Using credential store");
    let store = Arc::new(FileStore::new(path));

    CampusClient::new(config, store).context("Failed to create client")
}

/// Build a client and restore the persisted session.
///
/// Fails if there is no session to restore or the service rejects it.
pub async fn restore_session(args: &ConnectionArgs) -> Result<(CampusClient, Identity)> {
    let client = open_client(args)?;
    let state = client
        .bootstrap()
        .await
        .context("Failed to restore session")?;

    match state {
        SessionState::Authenticated(identity) => Ok((client, identity)),
        _ => bail!("No active session. Run 'campus auth login' first."),
    }
}

/// Returns true if the store holds any token.
pub fn has_stored_session(client: &CampusClient) -> Result<bool> {
    let session = client.session();
    Ok(session.access_token()?.is_some() || session.refresh_token()?.is_some())
}
