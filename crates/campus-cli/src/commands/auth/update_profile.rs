//! Update profile command implementation.

use anyhow::{Context, Result, bail};
use clap::Args;

use campus_core::IdentityPatch;

use crate::cli::ConnectionArgs;
use crate::output;
use crate::session::storage;

#[derive(Args, Debug)]
pub struct UpdateProfileArgs {
    #[arg(long)]
    pub username: Option<String>,

    #[arg(long)]
    pub first_name: Option<String>,

    #[arg(long)]
    pub last_name: Option<String>,

    #[arg(long)]
    pub bio: Option<String>,

    /// Avatar image URL
    #[arg(long)]
    pub avatar: Option<String>,
}

pub async fn run(args: UpdateProfileArgs, connection: &ConnectionArgs) -> Result<()> {
    let patch = IdentityPatch {
        username: args.username,
        first_name: args.first_name,
        last_name: args.last_name,
        bio: args.bio,
        avatar: args.avatar,
        ..Default::default()
    };
    if patch.is_empty() {
        bail!("Nothing to update; pass at least one field");
    }

    let (client, _identity) = storage::restore_session(connection).await?;
    let identity = client
        .update_profile(&patch)
        .await
        .context("Failed to update profile")?;

    output::success("Profile updated");
    output::field("User", &identity.username);
    output::field("Name", &identity.display_name());

    Ok(())
}
