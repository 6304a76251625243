//! Change password command implementation.

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::ConnectionArgs;
use crate::output;
use crate::session::storage;

#[derive(Args, Debug)]
pub struct ChangePasswordArgs {
    /// Current password
    #[arg(long, env = "CAMPUS_PASSWORD", hide_env_values = true)]
    pub old_password: String,

    /// New password
    #[arg(long, env = "CAMPUS_NEW_PASSWORD", hide_env_values = true)]
    pub new_password: String,
}

pub async fn run(args: ChangePasswordArgs, connection: &ConnectionArgs) -> Result<()> {
    let (client, _identity) = storage::restore_session(connection).await?;

    client
        .change_password(&args.old_password, &args.new_password)
        .await
        .context("Failed to change password")?;

    output::success("Password changed");

    Ok(())
}
