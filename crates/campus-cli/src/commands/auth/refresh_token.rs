//! Refresh token command implementation.

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::Colorize;

use crate::cli::ConnectionArgs;
use crate::output;
use crate::session::storage;

#[derive(Args, Debug)]
pub struct RefreshTokenArgs {}

pub async fn run(_args: RefreshTokenArgs, connection: &ConnectionArgs) -> Result<()> {
    let client = storage::open_client(connection)?;
    if client.session().refresh_token()?.is_none() {
        bail!("No active session. Run 'campus auth login' first.");
    }

    eprintln!("{}", "Refreshing session...".dimmed());

    client
        .refresh()
        .await
        .context("Failed to refresh session")?;

    output::success("Session refreshed successfully");

    Ok(())
}
