//! Logout command implementation.

use anyhow::Result;
use clap::Args;

use crate::cli::ConnectionArgs;
use crate::output;
use crate::session::storage;

#[derive(Args, Debug)]
pub struct LogoutArgs {}

pub async fn run(_args: LogoutArgs, connection: &ConnectionArgs) -> Result<()> {
    let client = storage::open_client(connection)?;

    if !storage::has_stored_session(&client)? {
        output::success("Not logged in");
        return Ok(());
    }

    client.logout().await;
    output::success("Logged out");

    Ok(())
}
