//! Whoami command implementation.

use anyhow::Result;
use clap::Args;

use crate::cli::ConnectionArgs;
use crate::output;
use crate::session::storage;

#[derive(Args, Debug)]
pub struct WhoamiArgs {
    /// Print the full profile as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: WhoamiArgs, connection: &ConnectionArgs) -> Result<()> {
    let (_client, identity) = storage::restore_session(connection).await?;

    if args.json {
        return output::json_pretty(&identity);
    }

    output::field("User", &identity.username);
    output::field("Name", &identity.display_name());
    output::field("Email", &identity.email);
    output::field("Level", &identity.level.to_string());
    output::field("Experience", &identity.experience.to_string());

    Ok(())
}
